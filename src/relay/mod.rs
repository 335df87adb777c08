//! The event relay: turns input edges into datagrams for the peer, retries
//! them per [`RetryPolicy`], and acts on channel changes sent by the peer.
//!
//! All state lives in [`RelayNode`] and is only touched from its loop. The
//! radio reports back through a queue of [`RadioEvent`]s instead of calling
//! into the node, so there is a single writer and no locking.

use common::packet::{self, InboundControl, Message, OutboundEvent};
use common::PeerAddress;
use embedded_hal::digital::InputPin;
use log::{debug, error, info, warn};
use tokio::time::{self, Instant, MissedTickBehavior};

use std::time::Duration;

use crate::binding::{self, LinkState};
use crate::config::NodeConfig;
use crate::input::{Edge, InputMonitor};
use crate::radio::{self, EventReceiver, Radio, RadioEvent};
use crate::store::{self, ChannelStorage, ChannelStore, CHANNEL_UNSET};

mod retry;

pub use retry::{RetryMode, RetryPolicy, RetryState};

use retry::SendSequence;

/// The peer asked us to move to `channel`. It has already been persisted;
/// the process has to restart for the radio to pick it up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartRequest {
    pub channel: i32,
}

pub struct RelayNode<P, R, S> {
    peer: PeerAddress,
    poll_interval: Duration,
    policy: RetryPolicy,
    monitor: InputMonitor<P>,
    radio: R,
    store: ChannelStore<S>,
    events: EventReceiver,
    link: LinkState,
    payload: OutboundEvent,
    retry: RetryState,
    sends: SendSequence,
}

impl<P, R, S> RelayNode<P, R, S>
where
    P: InputPin,
    R: Radio,
    S: ChannelStorage,
{
    /// Bring the radio up on the stored channel and build a node around it
    pub async fn start(
        config: &NodeConfig,
        pin: P,
        mut radio: R,
        mut store: ChannelStore<S>,
    ) -> Self {
        let (events_tx, events_rx) = radio::events();
        let link = binding::bring_up(
            &mut radio,
            &mut store,
            config.peer,
            config.channel_settle(),
            events_tx,
        )
        .await;

        Self::new(config, pin, radio, store, events_rx, link)
    }

    pub fn new(
        config: &NodeConfig,
        pin: P,
        radio: R,
        store: ChannelStore<S>,
        events: EventReceiver,
        link: LinkState,
    ) -> Self {
        Self {
            peer: config.peer,
            poll_interval: config.poll_interval(),
            policy: config.retry,
            monitor: InputMonitor::new(pin),
            radio,
            store,
            events,
            link,
            payload: OutboundEvent::default(),
            retry: RetryState::default(),
            sends: SendSequence::default(),
        }
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn store(&self) -> &ChannelStore<S> {
        &self.store
    }

    pub fn retry_state(&self) -> RetryState {
        self.retry
    }

    /// Payload of the most recent edge
    pub fn payload(&self) -> OutboundEvent {
        self.payload
    }

    /// Poll the input and serve radio events until the peer asks for a
    /// channel change
    pub async fn run(mut self) -> RestartRequest {
        info!(
            "Relaying to {} every {:?} ({:?})",
            self.peer, self.poll_interval, self.policy
        );

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let restart = tokio::select! {
                _ = ticker.tick() => self.poll().await,
                Some(event) = self.events.recv() => self.on_radio_event(event),
            };

            if let Some(restart) = restart {
                return restart;
            }
        }
    }

    /// Sample the input once and relay any edge
    pub async fn poll(&mut self) -> Option<RestartRequest> {
        let edge = self.monitor.poll()?;
        self.on_edge(edge).await
    }

    async fn on_edge(&mut self, edge: Edge) -> Option<RestartRequest> {
        // Last write wins: a retry still running for an older edge now
        // carries this payload instead
        self.payload = OutboundEvent {
            motion_detected: edge.motion_detected(),
        };

        if !self.link.is_ready() {
            warn!("Link is down, dropping {:?}", self.payload);
            return None;
        }

        if self.sends.outstanding() > 0 {
            debug!(
                "{} earlier send(s) still unreported, only the next one counts",
                self.sends.outstanding()
            );
        }

        self.retry.reset();
        match self.policy.attempt_timeout() {
            Some(timeout) => self.send_blocking(timeout).await,
            None => {
                self.send_until_accepted();
                None
            }
        }
    }

    /// Handle one notification from the radio
    pub fn on_radio_event(&mut self, event: RadioEvent) -> Option<RestartRequest> {
        match event {
            RadioEvent::SendComplete { peer, success } => {
                self.on_send_complete(peer, success);
                None
            }
            RadioEvent::Received { from, data } => self.on_receive(from, &data),
        }
    }

    /// Make one transmission attempt. Returns whether the radio accepted it.
    fn transmit(&mut self) -> bool {
        let attempt = self.retry.record_attempt();
        let max = self.policy.max_attempts;

        let frame = match packet::encode(&Message::Motion(self.payload)) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Could not encode {:?}: {}", self.payload, e);
                self.retry.settle();
                return false;
            }
        };

        match self.radio.send(self.peer, &frame) {
            Ok(()) => {
                self.sends.accept();
                info!("Attempt {}/{}: sent {:?}", attempt, max, self.payload);
                true
            }
            Err(e) => {
                warn!("Attempt {}/{}: error sending the data: {:#}", attempt, max, e);
                self.retry.settle();
                false
            }
        }
    }

    /// Non-blocking mode: keep trying until a send is in flight or the
    /// ceiling is reached
    fn send_until_accepted(&mut self) {
        while !self.retry.exhausted(&self.policy) {
            if self.transmit() {
                return;
            }
        }
        self.give_up();
    }

    /// Blocking mode: resend until a success, the ceiling, or an attempt
    /// that never completes
    async fn send_blocking(&mut self, attempt_timeout: Duration) -> Option<RestartRequest> {
        while !self.retry.exhausted(&self.policy) {
            if !self.transmit() {
                continue;
            }

            let deadline = Instant::now() + attempt_timeout;
            loop {
                match time::timeout_at(deadline, self.events.recv()).await {
                    Ok(Some(RadioEvent::SendComplete { peer, success })) => {
                        if !self.sends.complete() {
                            debug!(
                                "Ignoring send status for an earlier send to {} (success: {})",
                                peer, success
                            );
                            continue;
                        }
                        info!("Send Status: {}", if success { "Success" } else { "Fail" });
                        self.retry.settle();
                        if success {
                            self.retry.reset();
                            return None;
                        }
                        break;
                    }
                    Ok(Some(RadioEvent::Received { from, data })) => {
                        if let Some(restart) = self.on_receive(from, &data) {
                            return Some(restart);
                        }
                    }
                    Ok(None) => {
                        error!("Radio event queue closed, dropping {:?}", self.payload);
                        self.retry.reset();
                        return None;
                    }
                    Err(_) => {
                        warn!(
                            "No send status within {:?}, dropping {:?}",
                            attempt_timeout, self.payload
                        );
                        self.retry.reset();
                        return None;
                    }
                }
            }
        }

        self.give_up();
        None
    }

    fn on_send_complete(&mut self, peer: PeerAddress, success: bool) {
        // Always counted, so later completions line up with their sends
        let latest = self.sends.complete();
        if !latest || !self.retry.in_flight() {
            debug!("Ignoring stale send status from {} (success: {})", peer, success);
            return;
        }

        info!("Send Status: {}", if success { "Success" } else { "Fail" });
        self.retry.settle();

        if success {
            self.retry.reset();
        } else if self.retry.exhausted(&self.policy) {
            self.give_up();
        } else {
            self.send_until_accepted();
        }
    }

    fn give_up(&mut self) {
        info!(
            "Giving up on {:?} after {} attempts",
            self.payload,
            self.retry.attempts()
        );
        self.retry.reset();
    }

    fn on_receive(&mut self, from: PeerAddress, data: &[u8]) -> Option<RestartRequest> {
        if from != self.peer {
            warn!("Ignoring {} bytes from unknown sender {}", data.len(), from);
            return None;
        }

        match packet::decode(data) {
            Ok(Message::SetChannel(InboundControl { wifi_channel })) => {
                Some(self.change_channel(wifi_channel))
            }
            Ok(Message::Motion(event)) => {
                warn!("Ignoring {:?} from {}", event, from);
                None
            }
            Err(e) => {
                warn!("Ignoring datagram from {}: {}", from, e);
                None
            }
        }
    }

    fn change_channel(&mut self, channel: i32) -> RestartRequest {
        info!("Peer requested channel {}", channel);
        if channel != CHANNEL_UNSET && !store::is_valid_channel(channel) {
            warn!("Channel {} is out of range and will be ignored at boot", channel);
        }

        if self.retry.in_flight() {
            info!("Abandoning in-flight {:?}", self.payload);
        }
        self.retry.reset();

        self.store.store(channel);
        RestartRequest { channel }
    }
}
