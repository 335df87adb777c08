use anyhow::{anyhow, bail, Result};
use common::PeerAddress;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::espnow::{EspNow, PeerInfo, ReceiveInfo, SendStatus};
use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::{
    self as sys, esp, esp_wifi_get_channel, esp_wifi_set_channel, wifi_interface_t_WIFI_IF_STA,
    wifi_second_chan_t, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE,
};
use log::{info, warn};
use motion_relay::radio::{EventSender, Radio, RadioEvent};

/// ESP-NOW over the station interface
pub struct EspNowRadio {
    modem: Option<Modem>,
    sysloop: EspSystemEventLoop,
    wifi: Option<EspWifi<'static>>,
    espnow: Option<EspNow<'static>>,
}

impl EspNowRadio {
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Self {
        Self {
            modem: Some(modem),
            sysloop,
            wifi: None,
            espnow: None,
        }
    }

    fn espnow(&self) -> Result<&EspNow<'static>> {
        self.espnow
            .as_ref()
            .ok_or_else(|| anyhow!("ESP-NOW not initialized"))
    }
}

impl Radio for EspNowRadio {
    fn start_station(&mut self) -> Result<()> {
        let modem = self
            .modem
            .take()
            .ok_or_else(|| anyhow!("station already started"))?;

        // Wifi settings stay in RAM, the relay never joins an access point
        let mut wifi = EspWifi::new(modem, self.sysloop.clone(), None)?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
        wifi.start()?;

        info!("Wifi: station started");
        self.wifi = Some(wifi);
        Ok(())
    }

    fn set_channel(&mut self, channel: u8) -> Result<()> {
        if self.wifi.is_none() {
            bail!("station not started");
        }
        unsafe {
            esp!(esp_wifi_set_channel(
                channel,
                wifi_second_chan_t_WIFI_SECOND_CHAN_NONE
            ))?;
        }
        Ok(())
    }

    fn channel(&self) -> Option<u8> {
        self.wifi.as_ref()?;

        let mut primary: u8 = 0;
        let mut second: wifi_second_chan_t = wifi_second_chan_t_WIFI_SECOND_CHAN_NONE;
        let ret = unsafe { esp_wifi_get_channel(&mut primary, &mut second) };
        (ret == sys::ESP_OK).then_some(primary)
    }

    fn init_datagram(&mut self) -> Result<()> {
        if self.wifi.is_none() {
            bail!("station not started");
        }
        self.espnow = Some(EspNow::take()?);
        info!("ESP-NOW initialized");
        Ok(())
    }

    fn register_handlers(&mut self, events: EventSender) -> Result<()> {
        let espnow = self.espnow()?;

        // Both callbacks run on the wifi task; they only enqueue
        let send_events = events.clone();
        espnow.register_send_cb(move |mac: &[u8], status: SendStatus| {
            let Ok(peer) = <[u8; PeerAddress::LEN]>::try_from(mac) else {
                return;
            };
            let _ = send_events.send(RadioEvent::SendComplete {
                peer: PeerAddress(peer),
                success: matches!(status, SendStatus::SUCCESS),
            });
        })?;

        espnow.register_recv_cb(move |info: &ReceiveInfo, data: &[u8]| {
            let received = RadioEvent::Received {
                from: PeerAddress(*info.src_addr),
                data: data.to_vec(),
            };
            if events.send(received).is_err() {
                warn!("ESP-NOW: dropping datagram, node is gone");
            }
        })?;

        Ok(())
    }

    fn add_peer(&mut self, peer: PeerAddress, encrypt: bool) -> Result<()> {
        let info = PeerInfo {
            peer_addr: peer.octets(),
            // Follow whatever channel the station is on
            channel: 0,
            ifidx: wifi_interface_t_WIFI_IF_STA,
            encrypt,
            ..Default::default()
        };
        self.espnow()?.add_peer(info)?;
        info!("ESP-NOW: added peer {}", peer);
        Ok(())
    }

    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<()> {
        self.espnow()?.send(peer.octets(), payload)?;
        Ok(())
    }
}
