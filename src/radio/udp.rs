use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use common::packet::MAX_FRAME_SIZE;
use common::PeerAddress;
use log::{error, info, warn};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use super::{EventSender, Radio, RadioEvent};
use crate::config::LinkConfig;

/// Channel a freshly started radio sits on
const DEFAULT_CHANNEL: u8 = 1;

/// Datagram link over UDP for development hosts.
///
/// Each datagram carries the sender's address in its first six bytes, the
/// way a radio frame carries the source MAC. The channel is folded into the
/// port numbers, so two nodes only hear each other when they agree on it.
pub struct UdpRadio {
    address: PeerAddress,
    link: LinkConfig,
    started: bool,
    channel: u8,
    socket: Option<Arc<UdpSocket>>,
    target: Option<SocketAddr>,
    events: Option<EventSender>,
    peers: Vec<PeerAddress>,
    rx_task: Option<JoinHandle<()>>,
}

impl UdpRadio {
    pub fn new(address: PeerAddress, link: &LinkConfig) -> Self {
        Self {
            address,
            link: link.clone(),
            started: false,
            channel: DEFAULT_CHANNEL,
            socket: None,
            target: None,
            events: None,
            peers: Vec::new(),
            rx_task: None,
        }
    }

    /// Where we listen, once the transport is up
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref()?.local_addr().ok()
    }

    fn port(base: u16, channel: u8) -> Result<u16> {
        base.checked_add(channel as u16)
            .ok_or_else(|| anyhow!("port {} + channel {} overflows", base, channel))
    }
}

impl Radio for UdpRadio {
    fn start_station(&mut self) -> Result<()> {
        self.started = true;
        info!("UDP link: station started on channel {}", self.channel);
        Ok(())
    }

    fn set_channel(&mut self, channel: u8) -> Result<()> {
        if self.socket.is_some() {
            bail!("cannot change channel after the transport is up");
        }
        self.channel = channel;
        Ok(())
    }

    fn channel(&self) -> Option<u8> {
        self.started.then_some(self.channel)
    }

    fn init_datagram(&mut self) -> Result<()> {
        if !self.started {
            bail!("station not started");
        }

        let listen = Self::port(self.link.listen_base_port, self.channel)?;
        let socket = std::net::UdpSocket::bind((self.link.bind.as_str(), listen))
            .with_context(|| format!("binding {}:{}", self.link.bind, listen))?;
        socket.set_nonblocking(true)?;

        let port = Self::port(self.link.peer_base_port, self.channel)?;
        let target = (self.link.peer_host.as_str(), port)
            .to_socket_addrs()
            .with_context(|| format!("resolving {}", self.link.peer_host))?
            .next()
            .ok_or_else(|| anyhow!("{} did not resolve", self.link.peer_host))?;

        info!("UDP link: listening on port {}, peer at {}", listen, target);
        self.socket = Some(Arc::new(UdpSocket::from_std(socket)?));
        self.target = Some(target);
        Ok(())
    }

    fn register_handlers(&mut self, events: EventSender) -> Result<()> {
        let socket = self
            .socket
            .clone()
            .ok_or_else(|| anyhow!("transport not initialized"))?;

        self.rx_task = Some(tokio::spawn(udp_rx_task(socket, events.clone())));
        self.events = Some(events);
        Ok(())
    }

    fn add_peer(&mut self, peer: PeerAddress, encrypt: bool) -> Result<()> {
        if encrypt {
            bail!("the UDP link does not support encrypted peers");
        }
        if self.peers.contains(&peer) {
            bail!("peer {} already registered", peer);
        }
        self.peers.push(peer);
        Ok(())
    }

    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<()> {
        if !self.peers.contains(&peer) {
            bail!("peer {} not registered", peer);
        }
        let (Some(socket), Some(target), Some(events)) =
            (&self.socket, self.target, &self.events)
        else {
            bail!("transport not initialized");
        };

        let mut datagram = Vec::with_capacity(PeerAddress::LEN + payload.len());
        datagram.extend_from_slice(&self.address.octets());
        datagram.extend_from_slice(payload);

        let success = match socket.try_send_to(&datagram, target) {
            Ok(_) => true,
            Err(e) => {
                warn!("UDP link: send to {} failed: {}", target, e);
                false
            }
        };

        // Nobody is listening for completions any more, which only happens
        // while the node is shutting down
        let _ = events.send(RadioEvent::SendComplete { peer, success });
        Ok(())
    }
}

impl Drop for UdpRadio {
    fn drop(&mut self) {
        if let Some(task) = self.rx_task.take() {
            task.abort();
        }
    }
}

async fn udp_rx_task(socket: Arc<UdpSocket>, events: EventSender) {
    info!("UDP RX task started");

    let mut buf = [0u8; PeerAddress::LEN + MAX_FRAME_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, origin)) => {
                let Some((source, data)) = buf[..len].split_first_chunk::<6>() else {
                    warn!("Dropping {} byte datagram from {}", len, origin);
                    continue;
                };

                let received = RadioEvent::Received {
                    from: PeerAddress(*source),
                    data: data.to_vec(),
                };
                if events.send(received).is_err() {
                    info!("UDP RX task stopping, node is gone");
                    return;
                }
            }
            Err(e) => {
                error!("UDP receive error: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
