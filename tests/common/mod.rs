//! Shared helpers for integration tests

#![allow(dead_code)]

pub mod sensor_mock;

use motion_sensor_bridge::{BridgeConfig, DeviceHandle, DeviceState};
use std::time::Duration;

pub const DEVICE_ID: &str = "d88b4c010003a1b2";

/// Config for [`DEVICE_ID`] with a short dispatch delay
pub fn test_config(api_url: &str) -> BridgeConfig {
    let mut config = BridgeConfig::for_device(DEVICE_ID, "test-token");
    config.api.url = api_url.to_string();
    config.api.timeout = Duration::from_secs(2);
    config.polling.dispatch_delay = Duration::from_millis(10);
    config.polling.interval = None;
    config
}

/// Poll the device snapshot until `done` holds
pub async fn wait_for_state<F>(handle: &DeviceHandle, mut done: F) -> DeviceState
where
    F: FnMut(&DeviceState) -> bool,
{
    for _ in 0..200 {
        let state = handle.snapshot().await.expect("device task running");
        if done(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("device state never reached the expected condition");
}
