use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;

use super::{ChannelStorage, StorageError};

/// Keeps the value in a small text file
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Make sure the directory holding `path` exists
    pub fn mount(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| StorageError::Mount(dir.display().to_string(), e))?;
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, op: &'static str, source: std::io::Error) -> StorageError {
        StorageError::Io {
            op,
            key: self.path.display().to_string(),
            source,
        }
    }
}

impl ChannelStorage for FileStorage {
    fn read_line(&mut self) -> Result<Option<String>, StorageError> {
        info!("Reading file: {}", self.path.display());

        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text.lines().next().unwrap_or_default().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error("read", e)),
        }
    }

    fn write(&mut self, text: &str) -> Result<(), StorageError> {
        info!("Writing file: {}", self.path.display());
        fs::write(&self.path, text).map_err(|e| self.io_error("write", e))
    }

    fn remove(&mut self) -> Result<bool, StorageError> {
        info!("Deleting file: {}", self.path.display());

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error("delete", e)),
        }
    }
}
