use std::time::Duration;

use anyhow::{Context, Result};
use common::PeerAddress;
use log::{error, info};

use crate::radio::{EventSender, Radio};
use crate::store::{self, ChannelStorage, ChannelStore};

/// Whether the radio link came up at boot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Ready,
    /// Bring-up failed part way. The node keeps polling its input but
    /// nothing is transmitted until the next restart.
    Degraded,
}

impl LinkState {
    pub fn is_ready(self) -> bool {
        self == LinkState::Ready
    }
}

/// Start the radio on the persisted channel and register `peer`.
///
/// A channel outside the valid range, `-1` included, leaves the radio on
/// whatever channel it starts on.
pub async fn bring_up<R, S>(
    radio: &mut R,
    store: &mut ChannelStore<S>,
    peer: PeerAddress,
    settle: Duration,
    events: EventSender,
) -> LinkState
where
    R: Radio,
    S: ChannelStorage,
{
    match try_bring_up(radio, store, peer, settle, events).await {
        Ok(()) => LinkState::Ready,
        Err(e) => {
            error!("Radio bring-up failed: {:#}", e);
            LinkState::Degraded
        }
    }
}

async fn try_bring_up<R, S>(
    radio: &mut R,
    store: &mut ChannelStore<S>,
    peer: PeerAddress,
    settle: Duration,
    events: EventSender,
) -> Result<()>
where
    R: Radio,
    S: ChannelStorage,
{
    radio.start_station().context("starting station mode")?;

    let channel = store.load();
    if store::is_valid_channel(channel) {
        info!("Setting channel {}", channel);
        radio
            .set_channel(channel as u8)
            .with_context(|| format!("setting channel {channel}"))?;
        tokio::time::sleep(settle).await;
    }

    radio.init_datagram().context("initializing datagram transport")?;
    radio
        .register_handlers(events)
        .context("registering radio handlers")?;
    radio
        .add_peer(peer, false)
        .with_context(|| format!("adding peer {peer}"))?;

    match radio.channel() {
        Some(channel) => info!("Channel: {}", channel),
        None => info!("Channel: unknown"),
    }

    Ok(())
}
