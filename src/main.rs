use anyhow::{Context, Error};
use log::info;
use motion_relay::prelude::*;
use motion_relay::radio::udp::UdpRadio;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load the config file
    let config = NodeConfig::load_or_default()?;

    info!("Starting input...");
    let pin = SysfsPin::export(&config.gpio_root, config.input_pin)?;

    info!("Starting storage...");
    let store = ChannelStore::mount(FileStorage::mount(&config.channel_file));

    info!("Starting radio...");
    let radio = UdpRadio::new(config.node_address, &config.link);

    let node = RelayNode::start(&config, pin, radio, store).await;
    let RestartRequest { channel } = node.run().await;

    info!("Restarting on channel {}", channel);
    restart()
}

/// Replace this process with a fresh copy of itself so the new channel is
/// picked up from storage
#[cfg(unix)]
fn restart() -> Result<(), Error> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("locating own executable")?;
    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(Error::new(err).context(format!("re-executing {}", exe.display())))
}

#[cfg(not(unix))]
fn restart() -> Result<(), Error> {
    let exe = std::env::current_exe().context("locating own executable")?;
    std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .with_context(|| format!("spawning {}", exe.display()))?;
    std::process::exit(0)
}
