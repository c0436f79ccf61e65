//! Bridge for a LoRa motion and temperature sensor
//!
//! Telemetry arrives over two independently timed channels: a rate
//! limited poll of the cloud API and a push event stream. Both are
//! normalized into one canonical [`services::Reading`] and stored through
//! a change-detecting broker that notifies only on change, except for the
//! always-live attributes.
//!
//! # Features
//!
//! - Tolerant field extraction across firmware payload variants
//! - Repair of offset-Fahrenheit temperature encodings
//! - Motion derivation from boolean, numeric, string and alarm signals
//! - Poll rate limiting with forced refresh
//! - JSON file persistence of the device state record
//! - Websocket push listener (`websocket` feature)

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod services;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::{http_client::SensorHttpClient, FetchRequest, SensorClient, SensorResponse};
pub use config::BridgeConfig;
pub use device::{
    actor::{spawn_device, DeviceHandle},
    Collaborators, IngestOutcome, MotionSensorDevice,
};
pub use error::{BridgeError, Result};
pub use services::{Attribute, AttributeEvent, DeviceState, MotionState, Reading};
