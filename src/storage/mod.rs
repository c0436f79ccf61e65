//! Persistence of the device state record
//!
//! Two implementations:
//! - in-memory storage (default, lost on restart)
//! - a JSON file holding the records of every device, keyed by device id

pub mod file_storage;
pub mod simple_storage;

use crate::error::Result;
use crate::services::DeviceState;

pub use file_storage::JsonFileStateStore;
pub use simple_storage::MemoryStateStore;

/// Key-value store of device state records
pub trait StateStore: Send + Sync {
    /// Load the stored record of a device
    fn load(&self, device_id: &str) -> Result<Option<DeviceState>>;

    /// Replace the stored record of a device
    fn save(&self, device_id: &str, state: &DeviceState) -> Result<()>;

    /// Delete the stored record; returns whether one existed
    fn remove(&self, device_id: &str) -> Result<bool>;
}
