//! Simple in-memory state storage
//!
//! Records live only as long as the process. Used when no state file is
//! configured, and in tests.

use crate::error::{BridgeError, Result};
use crate::services::DeviceState;
use crate::storage::StateStore;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory [`StateStore`]
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, DeviceState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, DeviceState>>> {
        self.records
            .lock()
            .map_err(|e| BridgeError::storage(format!("State store lock poisoned: {e}")))
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, device_id: &str) -> Result<Option<DeviceState>> {
        Ok(self.records()?.get(device_id).cloned())
    }

    fn save(&self, device_id: &str, state: &DeviceState) -> Result<()> {
        self.records()?
            .insert(device_id.to_string(), state.clone());
        Ok(())
    }

    fn remove(&self, device_id: &str) -> Result<bool> {
        Ok(self.records()?.remove(device_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_remove() {
        let store = MemoryStateStore::new();
        assert!(store.load("a").unwrap().is_none());

        let state = DeviceState {
            battery: Some(75),
            ..DeviceState::default()
        };
        store.save("a", &state).unwrap();
        assert_eq!(store.load("a").unwrap(), Some(state));
        assert_eq!(store.len(), 1);

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert!(store.is_empty());
    }
}
