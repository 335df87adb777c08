use anyhow::Result;
use esp_idf_hal::gpio::PinDriver;
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::io::vfs::MountedEventfs;
use log::*;
use motion_relay::prelude::*;

mod radio;
mod storage;

use radio::EspNowRadio;
use storage::NvsStorage;

fn main() -> Result<()> {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly.
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Motion relay firmware v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;

    // Tokio's reactor needs eventfd
    let _eventfs = MountedEventfs::mount(4)?;

    // The firmware runs on compiled-in defaults; the sensor is on GPIO12
    let config = NodeConfig::default();

    info!("Input: initializing on pin {}", config.input_pin);
    let pin = PinDriver::input(peripherals.pins.gpio12)?;

    let store = ChannelStore::mount(NvsStorage::mount());
    let radio = EspNowRadio::new(peripherals.modem, sysloop);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let RestartRequest { channel } = runtime.block_on(async {
        RelayNode::start(&config, pin, radio, store)
            .await
            .run()
            .await
    });

    info!("Restarting on channel {}", channel);
    esp_idf_hal::reset::restart();
}
