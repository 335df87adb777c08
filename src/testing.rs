//! Test doubles for the pin, storage and radio seams

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use common::packet::{self, InboundControl, Message};
use common::PeerAddress;
use embedded_hal::digital::{ErrorKind, ErrorType, InputPin};

use crate::config::DEFAULT_PEER;
use crate::input::PinState;
use crate::radio::{EventSender, Radio, RadioEvent};
use crate::store::{ChannelStorage, StorageError};

/// Plays back a fixed list of samples, then holds the last one
pub struct ScriptedPin {
    samples: VecDeque<PinState>,
    last: PinState,
    reads: usize,
    fail_after: Option<usize>,
}

#[derive(Debug)]
pub struct ScriptedPinError;

impl embedded_hal::digital::Error for ScriptedPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl ScriptedPin {
    pub fn new(samples: impl IntoIterator<Item = PinState>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
            last: PinState::Low,
            reads: 0,
            fail_after: None,
        }
    }

    /// Every read after the first `reads` fails
    pub fn fail_after(&mut self, reads: usize) {
        self.fail_after = Some(reads);
    }
}

impl ErrorType for ScriptedPin {
    type Error = ScriptedPinError;
}

impl InputPin for ScriptedPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        if self.fail_after.is_some_and(|n| self.reads >= n) {
            return Err(ScriptedPinError);
        }
        self.reads += 1;

        if let Some(sample) = self.samples.pop_front() {
            self.last = sample;
        }
        Ok(self.last == PinState::High)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

#[derive(Default)]
struct MemoryState {
    value: Option<String>,
    writes: usize,
    fail_writes: bool,
}

/// In-memory storage. Clones share the same value, so a test can keep a
/// handle after giving one to a store.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn with_value(value: &str) -> Self {
        let storage = Self::default();
        storage.state.lock().unwrap().value = Some(value.to_string());
        storage
    }

    pub fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    pub fn value(&self) -> Option<String> {
        self.state.lock().unwrap().value.clone()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

impl ChannelStorage for MemoryStorage {
    fn read_line(&mut self) -> Result<Option<String>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .value
            .as_ref()
            .map(|value| value.lines().next().unwrap_or_default().to_string()))
    }

    fn write(&mut self, text: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(StorageError::Backend {
                op: "write",
                key: "channel".to_string(),
                reason: "write refused".to_string(),
            });
        }
        state.value = Some(text.to_string());
        state.writes += 1;
        Ok(())
    }

    fn remove(&mut self) -> Result<bool, StorageError> {
        Ok(self.state.lock().unwrap().value.take().is_some())
    }
}

/// What the mock radio does with one `send`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Accept and report success
    Success,
    /// Accept and report failure
    Fail,
    /// Accept and never report back
    Silent,
    /// Refuse synchronously
    Reject,
}

struct MockState {
    fallback: Outcome,
    script: VecDeque<Outcome>,
    events: Option<EventSender>,
    channel: Option<u8>,
    channels_set: Vec<u8>,
    peers: Vec<(PeerAddress, bool)>,
    sent: Vec<Vec<u8>>,
    send_calls: usize,
    fail_start: bool,
    fail_init: bool,
    fail_add_peer: bool,
}

/// Radio that completes sends according to a script. Completions are pushed
/// onto the event queue straight from `send`, the way a driver callback
/// would.
#[derive(Clone)]
pub struct MockRadio {
    state: Arc<Mutex<MockState>>,
}

impl MockRadio {
    pub fn new(fallback: Outcome) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                fallback,
                script: VecDeque::new(),
                events: None,
                channel: Some(1),
                channels_set: Vec::new(),
                peers: Vec::new(),
                sent: Vec::new(),
                send_calls: 0,
                fail_start: false,
                fail_init: false,
                fail_add_peer: false,
            })),
        }
    }

    /// Outcomes for the next sends, before falling back
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.state.lock().unwrap().script.extend(outcomes);
    }

    pub fn set_fallback(&self, fallback: Outcome) {
        self.state.lock().unwrap().fallback = fallback;
    }

    pub fn fail_start(&self) {
        self.state.lock().unwrap().fail_start = true;
    }

    pub fn fail_init(&self) {
        self.state.lock().unwrap().fail_init = true;
    }

    pub fn fail_add_peer(&self) {
        self.state.lock().unwrap().fail_add_peer = true;
    }

    /// Deliver a datagram as if it came over the air
    pub fn receive(&self, from: PeerAddress, data: Vec<u8>) {
        self.push(RadioEvent::Received { from, data });
    }

    /// Report a send outcome out of the blue
    pub fn complete(&self, success: bool) {
        self.push(RadioEvent::SendComplete {
            peer: DEFAULT_PEER,
            success,
        });
    }

    pub fn channels_set(&self) -> Vec<u8> {
        self.state.lock().unwrap().channels_set.clone()
    }

    pub fn peers(&self) -> Vec<(PeerAddress, bool)> {
        self.state.lock().unwrap().peers.clone()
    }

    /// Sends made, including the refused ones
    pub fn send_calls(&self) -> usize {
        self.state.lock().unwrap().send_calls
    }

    /// Motion values of every accepted send, in order
    pub fn sent_events(&self) -> Vec<bool> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .map(|frame| match packet::decode(frame).unwrap() {
                Message::Motion(event) => event.motion_detected,
                other => panic!("unexpected {other:?} on the wire"),
            })
            .collect()
    }

    fn push(&self, event: RadioEvent) {
        if let Some(events) = &self.state.lock().unwrap().events {
            let _ = events.send(event);
        }
    }
}

impl Radio for MockRadio {
    fn start_station(&mut self) -> Result<()> {
        if self.state.lock().unwrap().fail_start {
            bail!("station refused to start");
        }
        Ok(())
    }

    fn set_channel(&mut self, channel: u8) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.channels_set.push(channel);
        state.channel = Some(channel);
        Ok(())
    }

    fn channel(&self) -> Option<u8> {
        self.state.lock().unwrap().channel
    }

    fn init_datagram(&mut self) -> Result<()> {
        if self.state.lock().unwrap().fail_init {
            bail!("datagram transport unavailable");
        }
        Ok(())
    }

    fn register_handlers(&mut self, events: EventSender) -> Result<()> {
        self.state.lock().unwrap().events = Some(events);
        Ok(())
    }

    fn add_peer(&mut self, peer: PeerAddress, encrypt: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_add_peer {
            bail!("peer table full");
        }
        state.peers.push((peer, encrypt));
        Ok(())
    }

    fn send(&mut self, peer: PeerAddress, payload: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.send_calls += 1;

        let outcome = state.script.pop_front().unwrap_or(state.fallback);
        if outcome == Outcome::Reject {
            bail!("send queue full");
        }
        state.sent.push(payload.to_vec());

        let success = match outcome {
            Outcome::Success => true,
            Outcome::Fail => false,
            _ => return Ok(()),
        };
        if let Some(events) = &state.events {
            let _ = events.send(RadioEvent::SendComplete { peer, success });
        }
        Ok(())
    }
}

/// Encoded control message asking for `wifi_channel`
pub fn control_frame(wifi_channel: i32) -> Vec<u8> {
    packet::encode(&Message::SetChannel(InboundControl { wifi_channel }))
        .unwrap()
        .to_vec()
}
