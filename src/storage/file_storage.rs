//! JSON file state storage
//!
//! All records share one file. Writes go to a temporary file in the same
//! directory which then replaces the old one, so a crash never leaves a
//! half-written file behind.

use crate::error::{BridgeError, Result};
use crate::services::DeviceState;
use crate::storage::StateStore;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

type Records = BTreeMap<String, DeviceState>;

/// File-backed [`StateStore`]
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Using state file {}", path.display());
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn read_records(&self) -> Result<Records> {
        if !self.path.exists() {
            return Ok(Records::new());
        }
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(Records::new());
        }
        serde_json::from_str(&text).map_err(|e| {
            BridgeError::storage(format!(
                "Corrupt state file {}: {e}",
                self.path.display()
            ))
        })
    }

    fn write_records(&self, records: &Records) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let json = serde_json::to_string_pretty(records)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| {
            BridgeError::storage(format!(
                "Failed to replace state file {}: {}",
                self.path.display(),
                e.error
            ))
        })?;
        debug!(records = records.len(), "State file written");
        Ok(())
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut Records) -> (T, bool)) -> Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| BridgeError::storage(format!("State file lock poisoned: {e}")))?;
        let mut records = self.read_records()?;
        let (result, dirty) = f(&mut records);
        if dirty {
            self.write_records(&records)?;
        }
        Ok(result)
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self, device_id: &str) -> Result<Option<DeviceState>> {
        self.with_records(|records| (records.get(device_id).cloned(), false))
    }

    fn save(&self, device_id: &str, state: &DeviceState) -> Result<()> {
        self.with_records(|records| {
            let unchanged = records.get(device_id) == Some(state);
            if !unchanged {
                records.insert(device_id.to_string(), state.clone());
            }
            ((), !unchanged)
        })
    }

    fn remove(&self, device_id: &str) -> Result<bool> {
        self.with_records(|records| {
            let existed = records.remove(device_id).is_some();
            (existed, existed)
        })
    }
}
