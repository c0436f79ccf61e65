//! Normalization and state services
//!
//! Everything between a raw payload and a stored attribute lives here:
//! field extraction, the temperature and motion heuristics, timestamp
//! rendering, fetch classification and the change-detecting broker.

pub mod collaborators;
pub mod failure;
pub mod motion;
pub mod payload;
pub mod state_manager;
pub mod temperature;
pub mod timestamp;

pub use collaborators::{
    BatteryMapper, DisplayFormat, QuartileBatteryMapper, ScaleConverter, StandardScaleConverter,
    TemperatureScale,
};
pub use failure::{FetchOutcome, SUCCESS_CODE};
pub use motion::{derive_motion, MotionState};
pub use payload::{PayloadNormalizer, RadioLink, Reading, Rejection, Transport};
pub use state_manager::{
    Attribute, AttributeEvent, AttributeValue, BroadcastSink, DeviceState, NotificationSink,
    StateBroker,
};
pub use temperature::TemperatureNormalizer;
pub use timestamp::normalize_timestamp;
