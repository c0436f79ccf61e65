//! Seams to the host: scale conversion, battery mapping and display format
//!
//! The normalizers only depend on these traits. The default implementations
//! cover the common case and are what the binary wires up.

use crate::config::DisplayConfig;
use crate::error::{BridgeError, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Temperature scale selected by the user
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureScale {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureScale {
    /// Unit label attached to temperature notifications
    pub fn unit(&self) -> &'static str {
        match self {
            TemperatureScale::Celsius => "°C",
            TemperatureScale::Fahrenheit => "°F",
        }
    }
}

/// Converts a Celsius value into the user's preferred scale
#[cfg_attr(test, mockall::automock)]
pub trait ScaleConverter: Send + Sync {
    fn convert(&self, celsius: f64, scale: TemperatureScale) -> Result<f64>;
}

/// Maps a raw battery code to a percentage
pub trait BatteryMapper: Send + Sync {
    fn percent(&self, raw: &Value) -> Option<u8>;
}

/// Supplies formatting preferences to the normalizers
pub trait DisplayFormat: Send + Sync {
    /// chrono `strftime` pattern
    fn date_pattern(&self) -> &str;

    /// Offset timestamps are rendered in
    fn timezone(&self) -> FixedOffset;

    /// Active temperature scale
    fn temperature_scale(&self) -> TemperatureScale;
}

/// Standard conversion, rounded to one decimal place
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScaleConverter;

impl ScaleConverter for StandardScaleConverter {
    fn convert(&self, celsius: f64, scale: TemperatureScale) -> Result<f64> {
        if !celsius.is_finite() {
            return Err(BridgeError::conversion(format!(
                "non-finite temperature {celsius}"
            )));
        }
        let value = match scale {
            TemperatureScale::Celsius => celsius,
            TemperatureScale::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        };
        Ok((value * 10.0).round() / 10.0)
    }
}

/// Battery reported as a level from 0 (empty) to 4 (full)
#[derive(Debug, Clone, Copy, Default)]
pub struct QuartileBatteryMapper;

impl QuartileBatteryMapper {
    const MAX_LEVEL: i64 = 4;
}

impl BatteryMapper for QuartileBatteryMapper {
    fn percent(&self, raw: &Value) -> Option<u8> {
        let level = match raw {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }?;

        if (0..=Self::MAX_LEVEL).contains(&level) {
            Some((level * 100 / Self::MAX_LEVEL) as u8)
        } else {
            None
        }
    }
}

impl DisplayFormat for DisplayConfig {
    fn date_pattern(&self) -> &str {
        &self.date_format
    }

    fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    fn temperature_scale(&self) -> TemperatureScale {
        self.temperature_scale
    }
}
