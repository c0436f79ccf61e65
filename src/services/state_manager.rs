//! Device state record and the change-detecting broker
//!
//! The broker is the only writer of [`DeviceState`]. A value is stored and
//! announced when it differs from the stored one, when the caller forces
//! it, or when the attribute is always-live. Always-live attributes are
//! the ones automations react to on every report, not only on change.

use crate::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default capacity of the broadcast channel
const BROADCAST_CAPACITY: usize = 256;

/// Named slot of the device state record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Online,
    Temperature,
    Battery,
    Firmware,
    DeviceState,
    Motion,
    ReportedAt,
    ChangedAt,
    NetworkType,
    Signal,
    GatewayCount,
    GatewayId,
    DeviceId,
    Token,
    LastPoll,
    LastResponse,
    Debug,
}

impl Attribute {
    pub const ALL: [Attribute; 17] = [
        Attribute::Online,
        Attribute::Temperature,
        Attribute::Battery,
        Attribute::Firmware,
        Attribute::DeviceState,
        Attribute::Motion,
        Attribute::ReportedAt,
        Attribute::ChangedAt,
        Attribute::NetworkType,
        Attribute::Signal,
        Attribute::GatewayCount,
        Attribute::GatewayId,
        Attribute::DeviceId,
        Attribute::Token,
        Attribute::LastPoll,
        Attribute::LastResponse,
        Attribute::Debug,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Online => "online",
            Attribute::Temperature => "temperature",
            Attribute::Battery => "battery",
            Attribute::Firmware => "firmware",
            Attribute::DeviceState => "device_state",
            Attribute::Motion => "motion",
            Attribute::ReportedAt => "reported_at",
            Attribute::ChangedAt => "changed_at",
            Attribute::NetworkType => "network_type",
            Attribute::Signal => "signal",
            Attribute::GatewayCount => "gateway_count",
            Attribute::GatewayId => "gateway_id",
            Attribute::DeviceId => "device_id",
            Attribute::Token => "token",
            Attribute::LastPoll => "last_poll",
            Attribute::LastResponse => "last_response",
            Attribute::Debug => "debug",
        }
    }

    /// Announced on every write, changed or not
    pub fn is_always_live(&self) -> bool {
        matches!(
            self,
            Attribute::Battery
                | Attribute::Temperature
                | Attribute::Motion
                | Attribute::Signal
                | Attribute::LastResponse
                | Attribute::LastPoll
        )
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value held by one attribute slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<u8> for AttributeValue {
    fn from(value: u8) -> Self {
        AttributeValue::Integer(value.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Integer(value.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

/// Latest known value of every attribute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    pub online: Option<bool>,
    pub temperature: Option<f64>,
    pub battery: Option<i64>,
    pub firmware: Option<String>,
    pub device_state: Option<String>,
    pub motion: Option<String>,
    pub reported_at: Option<String>,
    pub changed_at: Option<String>,
    pub network_type: Option<String>,
    pub signal: Option<i64>,
    pub gateway_count: Option<i64>,
    pub gateway_id: Option<String>,
    pub device_id: Option<String>,
    pub token: Option<String>,
    pub last_poll: Option<String>,
    pub last_response: Option<String>,
    pub debug: Option<bool>,
}

impl DeviceState {
    /// Current value of a slot
    pub fn get(&self, attribute: Attribute) -> Option<AttributeValue> {
        match attribute {
            Attribute::Online => self.online.map(AttributeValue::Bool),
            Attribute::Temperature => self.temperature.map(AttributeValue::Number),
            Attribute::Battery => self.battery.map(AttributeValue::Integer),
            Attribute::Firmware => self.firmware.clone().map(AttributeValue::Text),
            Attribute::DeviceState => self.device_state.clone().map(AttributeValue::Text),
            Attribute::Motion => self.motion.clone().map(AttributeValue::Text),
            Attribute::ReportedAt => self.reported_at.clone().map(AttributeValue::Text),
            Attribute::ChangedAt => self.changed_at.clone().map(AttributeValue::Text),
            Attribute::NetworkType => self.network_type.clone().map(AttributeValue::Text),
            Attribute::Signal => self.signal.map(AttributeValue::Integer),
            Attribute::GatewayCount => self.gateway_count.map(AttributeValue::Integer),
            Attribute::GatewayId => self.gateway_id.clone().map(AttributeValue::Text),
            Attribute::DeviceId => self.device_id.clone().map(AttributeValue::Text),
            Attribute::Token => self.token.clone().map(AttributeValue::Text),
            Attribute::LastPoll => self.last_poll.clone().map(AttributeValue::Text),
            Attribute::LastResponse => self.last_response.clone().map(AttributeValue::Text),
            Attribute::Debug => self.debug.map(AttributeValue::Bool),
        }
    }

    /// Overwrite a slot, rejecting values of the wrong kind
    pub fn put(&mut self, attribute: Attribute, value: &AttributeValue) -> Result<()> {
        let mismatch = || {
            BridgeError::invalid_input(format!("{value:?} does not fit attribute {attribute}"))
        };
        let text = || value.as_text().map(str::to_string).ok_or_else(mismatch);

        match attribute {
            Attribute::Online => self.online = Some(value.as_bool().ok_or_else(mismatch)?),
            Attribute::Debug => self.debug = Some(value.as_bool().ok_or_else(mismatch)?),
            Attribute::Temperature => {
                self.temperature = Some(value.as_number().ok_or_else(mismatch)?)
            }
            Attribute::Battery => self.battery = Some(value.as_integer().ok_or_else(mismatch)?),
            Attribute::Signal => self.signal = Some(value.as_integer().ok_or_else(mismatch)?),
            Attribute::GatewayCount => {
                self.gateway_count = Some(value.as_integer().ok_or_else(mismatch)?)
            }
            Attribute::Firmware => self.firmware = Some(text()?),
            Attribute::DeviceState => self.device_state = Some(text()?),
            Attribute::Motion => self.motion = Some(text()?),
            Attribute::ReportedAt => self.reported_at = Some(text()?),
            Attribute::ChangedAt => self.changed_at = Some(text()?),
            Attribute::NetworkType => self.network_type = Some(text()?),
            Attribute::GatewayId => self.gateway_id = Some(text()?),
            Attribute::DeviceId => self.device_id = Some(text()?),
            Attribute::Token => self.token = Some(text()?),
            Attribute::LastPoll => self.last_poll = Some(text()?),
            Attribute::LastResponse => self.last_response = Some(text()?),
        }
        Ok(())
    }

    /// Copy safe to print or log
    pub fn redacted(&self) -> Self {
        Self {
            token: self.token.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }
}

/// Notification emitted for a stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeEvent {
    pub attribute: Attribute,
    pub value: String,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Receiver of attribute notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: AttributeEvent);
}

/// Sink fanning events out over a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<AttributeEvent>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self::with_capacity(BROADCAST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttributeEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: AttributeEvent) {
        if self.sender.send(event).is_err() {
            debug!("No subscribers for attribute event");
        }
    }
}

/// Sole writer of the device state
pub struct StateBroker {
    state: DeviceState,
    sink: Arc<dyn NotificationSink>,
}

impl StateBroker {
    pub fn new(state: DeviceState, sink: Arc<dyn NotificationSink>) -> Self {
        Self { state, sink }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Store and announce a value when it changed, is forced or always-live
    ///
    /// Returns whether an event was emitted.
    pub fn remember(
        &mut self,
        attribute: Attribute,
        value: impl Into<AttributeValue>,
        unit: Option<&str>,
        force: bool,
    ) -> bool {
        let value = value.into();
        let changed = self.state.get(attribute).as_ref() != Some(&value);
        if !(changed || force || attribute.is_always_live()) {
            return false;
        }

        if let Err(e) = self.state.put(attribute, &value) {
            warn!("Dropping update: {e}");
            return false;
        }

        let event = AttributeEvent {
            attribute,
            value: value.to_string(),
            unit: unit.map(str::to_string),
            timestamp: Utc::now(),
        };
        if attribute == Attribute::Token {
            debug!(%attribute, "Attribute updated");
        } else {
            debug!(%attribute, value = %event.value, changed, "Attribute updated");
        }
        self.sink.notify(event);
        true
    }

    /// Replace the record with a previously persisted one, without notifying
    pub fn restore(&mut self, state: DeviceState) {
        self.state = state;
    }

    /// Drop every stored value
    pub fn clear(&mut self) {
        self.state = DeviceState::default();
    }
}
