use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Error};
use common::PeerAddress;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::relay::RetryPolicy;

pub const CONFIG_PATH: &str = "config.ron";

/// Address of the LED node that receives motion updates
pub const DEFAULT_PEER: PeerAddress = PeerAddress::new([0xD4, 0x8A, 0xFC, 0xC7, 0xBB, 0xB0]);

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// GPIO line the motion sensor output is wired to
    pub input_pin: u8,
    /// Where exported GPIO lines are exposed on a Linux host
    pub gpio_root: PathBuf,
    /// Our own address, stamped on datagrams by links that do not carry one
    pub node_address: PeerAddress,
    pub peer: PeerAddress,
    pub poll_interval_ms: u64,
    /// Pause after retuning the radio before the transport is brought up
    pub channel_settle_ms: u64,
    pub channel_file: PathBuf,
    pub retry: RetryPolicy,
    pub link: LinkConfig,
}

/// UDP stand-in for the radio when running on an ordinary machine
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    pub bind: String,
    pub listen_base_port: u16,
    pub peer_host: String,
    pub peer_base_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            input_pin: 12,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            node_address: PeerAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            peer: DEFAULT_PEER,
            poll_interval_ms: 1000,
            channel_settle_ms: 1000,
            channel_file: PathBuf::from("channel.txt"),
            retry: RetryPolicy::blocking(),
            link: LinkConfig::default(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            listen_base_port: 4210,
            peer_host: "127.0.0.1".to_string(),
            peer_base_port: 4310,
        }
    }
}

impl NodeConfig {
    pub fn load() -> Result<NodeConfig, Error> {
        Self::load_from(CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<NodeConfig, Error> {
        let path = path.as_ref();
        let config = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: NodeConfig =
            ron::from_str(&config).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`NodeConfig::load`], but a missing file means defaults. A file
    /// that exists and is broken is still an error.
    pub fn load_or_default() -> Result<NodeConfig, Error> {
        if Path::new(CONFIG_PATH).exists() {
            Self::load()
        } else {
            warn!("{} not found, using default configuration", CONFIG_PATH);
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.attempt_timeout() == Some(Duration::ZERO) {
            bail!("retry attempt_timeout_ms must be greater than zero");
        }
        if self.peer == self.node_address {
            bail!("peer and node_address are both {}", self.peer);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn channel_settle(&self) -> Duration {
        Duration::from_millis(self.channel_settle_ms)
    }
}
