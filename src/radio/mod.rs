use anyhow::Result;
use common::PeerAddress;
use tokio::sync::mpsc;

#[cfg(feature = "host")]
pub mod udp;

/// Notifications raised by the radio driver from its own execution context.
/// They are queued and consumed by the node loop only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RadioEvent {
    /// Outcome of one earlier [`Radio::send`]
    SendComplete { peer: PeerAddress, success: bool },
    /// A datagram arrived
    Received { from: PeerAddress, data: Vec<u8> },
}

pub type EventSender = mpsc::UnboundedSender<RadioEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<RadioEvent>;

pub fn events() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Connectionless, channel-bound datagram link.
///
/// Calls are made in the order the binding brings the link up:
/// `start_station`, optionally `set_channel`, `init_datagram`,
/// `register_handlers`, `add_peer`, and then any number of `send`s.
pub trait Radio {
    /// Power up in client-only mode
    fn start_station(&mut self) -> Result<()>;

    fn set_channel(&mut self, channel: u8) -> Result<()>;

    /// The channel the radio is tuned to, if it can tell
    fn channel(&self) -> Option<u8>;

    fn init_datagram(&mut self) -> Result<()>;

    /// Deliver send completions and received datagrams to `events`
    fn register_handlers(&mut self, events: EventSender) -> Result<()>;

    fn add_peer(&mut self, peer: PeerAddress, encrypt: bool) -> Result<()>;

    /// Start a transmission. `Ok` only means the radio accepted the
    /// datagram; the result arrives later as [`RadioEvent::SendComplete`].
    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<()>;
}
