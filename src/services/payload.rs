//! Payload normalization
//!
//! Turns the loosely structured payloads of both transports into one
//! canonical [`Reading`]. There is no authoritative schema: every logical
//! field has an ordered chain of locations and the first non-null hit wins.
//!
//! Poll responses carry the device fields in a nested `data.state` object.
//! Push events put them directly under `data`, where `state` is usually the
//! plain device state string and only sometimes a nested object.

use crate::services::collaborators::{BatteryMapper, DisplayFormat, ScaleConverter};
use crate::services::motion::{derive_motion, MotionState};
use crate::services::temperature::TemperatureNormalizer;
use crate::services::timestamp::normalize_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Temperature keys, tried in order at every level
pub const TEMPERATURE_KEYS: &[&str] = &["temperature", "temp", "devTemperature"];

const BATTERY_KEYS: &[&str] = &["battery"];
const FIRMWARE_KEYS: &[&str] = &["version"];
const MOTION_KEYS: &[&str] = &["motion"];
const REPORTED_AT_KEYS: &[&str] = &["reportAt"];
const CHANGED_AT_KEYS: &[&str] = &["stateChangedAt"];
const RADIO_LINK_KEYS: &[&str] = &["loraInfo"];
const DEVICE_ID_KEY: &str = "deviceId";

/// Transport a payload arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Poll,
    Push,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Poll => f.write_str("poll"),
            Transport::Push => f.write_str("push"),
        }
    }
}

/// Gateway and signal metadata of the LoRa hop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioLink {
    pub network_type: Option<String>,
    pub signal_dbm: Option<i64>,
    pub gateway_count: Option<u32>,
    pub gateway_id: Option<String>,
}

/// Canonical reading produced from either transport
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature_raw: Option<Value>,
    pub temperature_value: Option<f64>,
    pub battery_percent: Option<u8>,
    pub firmware_version: Option<String>,
    pub device_state: Option<String>,
    pub motion_state: MotionState,
    pub reported_at: Option<String>,
    pub changed_at: Option<String>,
    pub radio_link: Option<RadioLink>,
}

/// Why a payload was not turned into a reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The payload names a different device
    ForeignDevice { reported: String },
    /// A push payload without any device identifier
    MissingDeviceId,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ForeignDevice { reported } => write!(f, "payload for device {reported}"),
            Rejection::MissingDeviceId => f.write_str("payload without device id"),
        }
    }
}

/// Ordered lookup locations for one payload
struct FieldSources<'v> {
    levels: Vec<&'v Value>,
    envelope: Option<&'v Value>,
    state_text: Option<&'v str>,
    state_block: Option<&'v Value>,
}

impl<'v> FieldSources<'v> {
    /// `data` first, then `data.state` when it is an object
    fn for_poll(data: &'v Value) -> Self {
        let state = data.get("state");
        let state_block = state.filter(|s| s.is_object());
        let state_text = state_block
            .and_then(|block| block.get("state"))
            .and_then(Value::as_str)
            .or_else(|| state.and_then(Value::as_str));

        let mut levels = vec![data];
        levels.extend(state_block);
        Self {
            levels,
            envelope: None,
            state_text,
            state_block,
        }
    }

    /// `data` first; `data.state` is either the device state string or a
    /// secondary object
    fn for_push(envelope: &'v Value) -> Self {
        let data = envelope.get("data").unwrap_or(envelope);
        let state = data.get("state");
        let state_block = state.filter(|s| s.is_object());
        let state_text = state.and_then(Value::as_str).or_else(|| {
            state_block
                .and_then(|block| block.get("state"))
                .and_then(Value::as_str)
        });

        let mut levels = vec![data];
        levels.extend(state_block);
        Self {
            levels,
            envelope: Some(envelope),
            state_text,
            state_block,
        }
    }

    /// First non-null value, level by level, key by key
    fn lookup(&self, keys: &[&str]) -> Option<&'v Value> {
        self.levels.iter().find_map(|level| {
            keys.iter()
                .filter_map(|key| level.get(*key))
                .find(|value| !value.is_null())
        })
    }
}

/// Normalizer bound to a device identity and the host collaborators
pub struct PayloadNormalizer<'a> {
    device_id: &'a str,
    converter: &'a dyn ScaleConverter,
    battery: &'a dyn BatteryMapper,
    display: &'a dyn DisplayFormat,
}

impl<'a> PayloadNormalizer<'a> {
    pub fn new(
        device_id: &'a str,
        converter: &'a dyn ScaleConverter,
        battery: &'a dyn BatteryMapper,
        display: &'a dyn DisplayFormat,
    ) -> Self {
        Self {
            device_id,
            converter,
            battery,
            display,
        }
    }

    /// Normalize the `data` object of a poll response
    ///
    /// The response answers a request addressed to this device, so a missing
    /// identifier is accepted; a different one is not.
    pub fn normalize_poll(
        &self,
        response_device_id: Option<&str>,
        data: &Value,
    ) -> Result<Reading, Rejection> {
        let reported = response_device_id.or_else(|| data.get(DEVICE_ID_KEY).and_then(Value::as_str));
        if let Some(reported) = reported {
            self.check_identity(reported)?;
        }

        Ok(self.build_reading(&FieldSources::for_poll(data)))
    }

    /// Normalize a push event envelope
    pub fn normalize_push(&self, envelope: &Value) -> Result<Reading, Rejection> {
        let reported = envelope
            .get(DEVICE_ID_KEY)
            .and_then(Value::as_str)
            .or_else(|| {
                envelope
                    .get("data")
                    .and_then(|d| d.get(DEVICE_ID_KEY))
                    .and_then(Value::as_str)
            })
            .ok_or(Rejection::MissingDeviceId)?;
        self.check_identity(reported)?;

        Ok(self.build_reading(&FieldSources::for_push(envelope)))
    }

    fn check_identity(&self, reported: &str) -> Result<(), Rejection> {
        if reported == self.device_id {
            Ok(())
        } else {
            Err(Rejection::ForeignDevice {
                reported: reported.to_string(),
            })
        }
    }

    fn build_reading(&self, sources: &FieldSources<'_>) -> Reading {
        let temperature_raw = sources.lookup(TEMPERATURE_KEYS).cloned();
        let temperature_value = temperature_raw.as_ref().and_then(|raw| {
            TemperatureNormalizer::new(self.converter, self.display.temperature_scale())
                .normalize(raw)
        });

        let battery_percent = sources.lookup(BATTERY_KEYS).and_then(|raw| {
            let percent = self.battery.percent(raw);
            if percent.is_none() {
                warn!("Unrecognized battery value {raw}");
            }
            percent
        });

        let firmware_version = sources
            .lookup(FIRMWARE_KEYS)
            .and_then(text_of)
            .map(|v| v.to_uppercase());

        let motion_state = derive_motion(
            sources.lookup(MOTION_KEYS),
            sources.state_text,
            sources.state_block,
        );

        let reported_at = sources
            .lookup(REPORTED_AT_KEYS)
            .or_else(|| sources.envelope.and_then(|e| e.get("time")))
            .and_then(|raw| normalize_timestamp(raw, self.display));
        let changed_at = sources
            .lookup(CHANGED_AT_KEYS)
            .and_then(|raw| normalize_timestamp(raw, self.display));

        let radio_link = sources
            .lookup(RADIO_LINK_KEYS)
            .filter(|info| info.is_object())
            .map(parse_radio_link);

        let reading = Reading {
            temperature_raw,
            temperature_value,
            battery_percent,
            firmware_version,
            device_state: sources.state_text.map(str::to_string),
            motion_state,
            reported_at,
            changed_at,
            radio_link,
        };
        debug!(?reading, "Normalized payload");
        reading
    }
}

fn parse_radio_link(info: &Value) -> RadioLink {
    RadioLink {
        network_type: ["devNetType", "netId"]
            .iter()
            .filter_map(|key| info.get(*key))
            .find_map(text_of),
        signal_dbm: info.get("signal").and_then(integer_of),
        gateway_count: info
            .get("gateways")
            .and_then(integer_of)
            .and_then(|n| u32::try_from(n).ok()),
        gateway_id: info.get("gatewayId").and_then(text_of),
    }
}

/// String form of a scalar; `None` for null, empty strings and containers
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn integer_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}
