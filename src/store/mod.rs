use std::io;

use log::{info, warn};
use thiserror::Error;

mod file;

pub use file::FileStorage;

/// Stored when no channel has been assigned yet
pub const CHANNEL_UNSET: i32 = -1;

/// Highest 2.4 GHz channel the radio may be tuned to
pub const MAX_CHANNEL: i32 = 13;

pub fn is_valid_channel(channel: i32) -> bool {
    (0..=MAX_CHANNEL).contains(&channel)
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage could not be mounted at {0}")]
    Mount(String, #[source] io::Error),
    #[error("failed to {op} `{key}`")]
    Io {
        op: &'static str,
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to {op} `{key}`: {reason}")]
    Backend {
        op: &'static str,
        key: String,
        reason: String,
    },
}

/// A single persisted text value
pub trait ChannelStorage {
    /// First line of the stored value, `None` when nothing is stored
    fn read_line(&mut self) -> Result<Option<String>, StorageError>;

    fn write(&mut self, text: &str) -> Result<(), StorageError>;

    /// Returns whether there was anything to remove
    fn remove(&mut self) -> Result<bool, StorageError>;
}

/// Persists the radio channel across restarts.
///
/// Storage faults never escape from here: they are logged and the store
/// falls back to [`CHANNEL_UNSET`]. If the backend failed to mount, every
/// operation works on the in-memory value only.
pub struct ChannelStore<S> {
    backend: Option<S>,
    channel: i32,
}

impl<S: ChannelStorage> ChannelStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend: Some(backend),
            channel: CHANNEL_UNSET,
        }
    }

    pub fn mount(backend: Result<S, StorageError>) -> Self {
        match backend {
            Ok(backend) => {
                info!("Storage mounted successfully");
                Self::new(backend)
            }
            Err(e) => {
                warn!("An error has occurred while mounting storage: {}", e);
                Self {
                    backend: None,
                    channel: CHANNEL_UNSET,
                }
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.backend.is_some()
    }

    /// Last value loaded or stored in this process
    pub fn channel(&self) -> i32 {
        self.channel
    }

    pub fn backend(&self) -> Option<&S> {
        self.backend.as_ref()
    }

    pub fn load(&mut self) -> i32 {
        let Some(backend) = self.backend.as_mut() else {
            warn!("Storage unavailable, keeping channel {}", self.channel);
            return self.channel;
        };

        self.channel = match backend.read_line() {
            Ok(Some(text)) => match text.trim().parse::<i32>() {
                Ok(channel) => channel,
                Err(_) => {
                    warn!("Stored channel {:?} is not a number", text);
                    CHANNEL_UNSET
                }
            },
            Ok(None) => {
                info!("No stored channel");
                CHANNEL_UNSET
            }
            Err(e) => {
                warn!("- failed to open file for reading: {}", e);
                CHANNEL_UNSET
            }
        };

        info!("Channel on load: {}", self.channel);
        self.channel
    }

    /// Replace the stored channel. There is no rollback: if the delete
    /// succeeds and the write fails, nothing is stored and the next
    /// [`load`](Self::load) sees [`CHANNEL_UNSET`].
    ///
    /// Returns whether the new value reached storage.
    pub fn store(&mut self, channel: i32) -> bool {
        self.channel = channel;

        let Some(backend) = self.backend.as_mut() else {
            warn!("Storage unavailable, channel {} will not survive a restart", channel);
            return false;
        };

        info!("Deleting stored channel");
        match backend.remove() {
            Ok(true) => info!("- file deleted"),
            Ok(false) => info!("- nothing to delete"),
            Err(e) => warn!("- delete failed: {}", e),
        }

        info!("Writing channel {}", channel);
        match backend.write(&channel.to_string()) {
            Ok(()) => {
                info!("- file written");
                true
            }
            Err(e) => {
                warn!("- write failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStorage;

    fn file_store(dir: &tempfile::TempDir) -> ChannelStore<FileStorage> {
        ChannelStore::mount(FileStorage::mount(dir.path().join("channel.txt")))
    }

    #[test]
    fn test_missing_value_loads_unset() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = file_store(&dir);

        assert!(store.is_mounted());
        assert_eq!(store.load(), CHANNEL_UNSET);
    }

    #[test]
    fn test_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        for channel in 0..=MAX_CHANNEL {
            file_store(&dir).store(channel);

            // A fresh store over the same file is what the next boot sees
            assert_eq!(file_store(&dir).load(), channel);
        }
    }

    #[test]
    fn test_stored_text_is_decimal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_store(&dir).store(11));

        let store = file_store(&dir);
        let path = store.backend().unwrap().path();
        assert_eq!(path, dir.path().join("channel.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "11");
    }

    #[test]
    fn test_unparsable_value_loads_unset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("channel.txt"), "six\n").unwrap();

        assert_eq!(file_store(&dir).load(), CHANNEL_UNSET);
    }

    #[test]
    fn test_only_first_line_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("channel.txt"), "9\n3\n").unwrap();

        assert_eq!(file_store(&dir).load(), 9);
    }

    #[test]
    fn test_mount_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        // The parent "directory" is a regular file
        let mut store = ChannelStore::mount(FileStorage::mount(blocker.join("channel.txt")));
        assert!(!store.is_mounted());
        assert_eq!(store.load(), CHANNEL_UNSET);

        assert!(!store.store(4));
        assert_eq!(store.channel(), 4);
        assert_eq!(store.load(), 4);
    }

    #[test]
    fn test_failed_write_leaves_nothing_stored() {
        let storage = MemoryStorage::with_value("5");
        storage.fail_writes();
        let mut store = ChannelStore::new(storage.clone());

        assert!(!store.store(8));
        assert_eq!(storage.value(), None);
        assert_eq!(ChannelStore::new(storage).load(), CHANNEL_UNSET);
    }

    #[test]
    fn test_valid_channel_range() {
        assert!(!is_valid_channel(CHANNEL_UNSET));
        assert!(is_valid_channel(0));
        assert!(is_valid_channel(MAX_CHANNEL));
        assert!(!is_valid_channel(MAX_CHANNEL + 1));
    }
}
