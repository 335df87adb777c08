use esp_idf_sys::*;
use log::info;
use motion_relay::store::{ChannelStorage, StorageError};
use std::ffi::{c_char, CString};
use std::ptr;

/// NVS namespace for the relay's persisted settings
const NVS_NAMESPACE: &str = "motion_relay";
/// NVS key holding the radio channel as decimal text
const NVS_CHANNEL_KEY: &str = "channel";

/// Channel storage in the default NVS partition.
///
/// The value is kept as a string so the stored form matches what the host
/// build writes to its channel file.
pub struct NvsStorage {
    namespace: CString,
    key: CString,
}

impl NvsStorage {
    /// Bring up the NVS partition, erasing it if its layout is stale
    pub fn mount() -> Result<Self, StorageError> {
        let namespace = CString::new(NVS_NAMESPACE).map_err(|e| backend("mount", e))?;
        let key = CString::new(NVS_CHANNEL_KEY).map_err(|e| backend("mount", e))?;

        unsafe {
            let mut ret = nvs_flash_init();
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t
            {
                info!("NVS: partition needs erasing");
                esp!(nvs_flash_erase()).map_err(|e| backend("erase", e))?;
                ret = nvs_flash_init();
            }
            esp!(ret).map_err(|e| backend("mount", e))?;
        }

        Ok(Self { namespace, key })
    }

    fn open(&self, op: &'static str, mode: nvs_open_mode_t) -> Result<Handle, StorageError> {
        let mut handle: nvs_handle_t = 0;
        unsafe {
            esp!(nvs_open(self.namespace.as_ptr(), mode, &mut handle as *mut nvs_handle_t))
                .map_err(|e| backend(op, e))?;
        }
        Ok(Handle(handle))
    }
}

/// Closes the NVS handle when dropped
struct Handle(nvs_handle_t);

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe { nvs_close(self.0) }
    }
}

fn backend(op: &'static str, reason: impl std::fmt::Display) -> StorageError {
    StorageError::Backend {
        op,
        key: format!("{}/{}", NVS_NAMESPACE, NVS_CHANNEL_KEY),
        reason: reason.to_string(),
    }
}

fn is_not_found(ret: esp_err_t) -> bool {
    ret == ESP_ERR_NVS_NOT_FOUND as esp_err_t
}

impl ChannelStorage for NvsStorage {
    fn read_line(&mut self) -> Result<Option<String>, StorageError> {
        // The namespace only exists once something has been written
        let handle = match self.open("read", nvs_open_mode_t_NVS_READONLY) {
            Ok(handle) => handle,
            Err(_) => {
                info!("NVS: No saved channel found (namespace not found)");
                return Ok(None);
            }
        };

        unsafe {
            let mut len: usize = 0;
            let ret = nvs_get_str(handle.0, self.key.as_ptr(), ptr::null_mut(), &mut len);
            if is_not_found(ret) {
                info!("NVS: No saved channel found (key not found)");
                return Ok(None);
            }
            esp!(ret).map_err(|e| backend("read", e))?;

            let mut buf = vec![0u8; len];
            esp!(nvs_get_str(
                handle.0,
                self.key.as_ptr(),
                buf.as_mut_ptr() as *mut c_char,
                &mut len
            ))
            .map_err(|e| backend("read", e))?;

            // Drop the terminating NUL
            buf.truncate(len.saturating_sub(1));
            let text = String::from_utf8_lossy(&buf);
            Ok(Some(text.lines().next().unwrap_or_default().to_string()))
        }
    }

    fn write(&mut self, text: &str) -> Result<(), StorageError> {
        let value = CString::new(text).map_err(|e| backend("write", e))?;
        let handle = self.open("write", nvs_open_mode_t_NVS_READWRITE)?;

        unsafe {
            esp!(nvs_set_str(handle.0, self.key.as_ptr(), value.as_ptr()))
                .map_err(|e| backend("write", e))?;
            esp!(nvs_commit(handle.0)).map_err(|e| backend("commit", e))?;
        }

        info!("NVS: Saved channel {} to flash", text);
        Ok(())
    }

    fn remove(&mut self) -> Result<bool, StorageError> {
        let handle = self.open("delete", nvs_open_mode_t_NVS_READWRITE)?;

        unsafe {
            let ret = nvs_erase_key(handle.0, self.key.as_ptr());
            if is_not_found(ret) {
                return Ok(false);
            }
            esp!(ret).map_err(|e| backend("delete", e))?;
            esp!(nvs_commit(handle.0)).map_err(|e| backend("commit", e))?;
        }

        Ok(true)
    }
}
