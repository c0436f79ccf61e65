//! Temperature normalization
//!
//! Some firmware revisions report temperature as Fahrenheit shifted down by
//! a fixed constant instead of Celsius. Those readings land well below
//! -20 and are repaired here; genuine sub-zero Celsius readings outside the
//! narrow band are left alone.

use crate::services::collaborators::{ScaleConverter, TemperatureScale};
use serde_json::Value;
use tracing::{debug, warn};

/// Offset the affected firmware subtracts from Fahrenheit
pub const FAHRENHEIT_ENCODING_OFFSET: f64 = 136.0;

/// Readings at or above this are never reinterpreted
pub const CORRECTION_THRESHOLD: f64 = -20.0;

/// Plausible ambient Fahrenheit band a corrected value must fall into
pub const PLAUSIBLE_FAHRENHEIT: std::ops::RangeInclusive<f64> = 32.0..=122.0;

/// Coerce a raw number or numeric string
pub fn coerce_temperature(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

/// Repair the offset-Fahrenheit encoding, returning Celsius
pub fn correct_encoding(value: f64) -> f64 {
    if value >= CORRECTION_THRESHOLD {
        return value;
    }

    let candidate = value + FAHRENHEIT_ENCODING_OFFSET;
    if PLAUSIBLE_FAHRENHEIT.contains(&candidate) {
        let celsius = (candidate - 32.0) * 5.0 / 9.0;
        debug!(
            raw = value,
            fahrenheit = candidate,
            celsius,
            "Corrected offset-Fahrenheit temperature"
        );
        celsius
    } else {
        value
    }
}

/// Temperature normalizer bound to a scale converter
pub struct TemperatureNormalizer<'a> {
    converter: &'a dyn ScaleConverter,
    scale: TemperatureScale,
}

impl<'a> TemperatureNormalizer<'a> {
    pub fn new(converter: &'a dyn ScaleConverter, scale: TemperatureScale) -> Self {
        Self { converter, scale }
    }

    /// Normalize a raw reading into the active display scale
    ///
    /// `None` means the value could not be coerced; callers treat that the
    /// same as an absent field.
    pub fn normalize(&self, raw: &Value) -> Option<f64> {
        let Some(value) = coerce_temperature(raw) else {
            debug!("Ignoring non-numeric temperature {raw}");
            return None;
        };

        let celsius = correct_encoding(value);
        match self.converter.convert(celsius, self.scale) {
            Ok(converted) => Some(converted),
            Err(e) => {
                warn!("Scale conversion failed for {celsius}: {e}, using Celsius value");
                Some(celsius)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::services::collaborators::{MockScaleConverter, StandardScaleConverter};
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(-57.0, true)]
    #[case(-104.0, true)] // 32°F, lower edge of the band
    #[case(-105.0, false)] // 31°F
    #[case(-21.0, true)] // 115°F
    #[case(-20.0, false)] // threshold is exclusive
    #[case(-14.0, false)] // 122°F but not below the threshold
    #[case(-120.0, false)]
    #[case(22.5, false)]
    fn test_correction_band(#[case] raw: f64, #[case] corrected: bool) {
        assert_eq!(correct_encoding(raw) != raw, corrected);
    }

    #[test]
    fn test_correction_matches_rule_over_range() {
        let mut v = -200.0;
        while v <= 60.0 {
            let candidate = v + FAHRENHEIT_ENCODING_OFFSET;
            let should = v < -20.0 && (32.0..=122.0).contains(&candidate);
            let out = correct_encoding(v);
            if should {
                assert!((out - (candidate - 32.0) * 5.0 / 9.0).abs() < 1e-9, "v={v}");
            } else {
                assert_eq!(out, v, "v={v}");
            }
            v += 0.5;
        }
    }

    #[test]
    fn test_known_example() {
        let celsius = correct_encoding(-57.0);
        assert!((celsius - 26.111).abs() < 0.001);

        let normalizer = TemperatureNormalizer::new(&StandardScaleConverter, TemperatureScale::Celsius);
        assert_eq!(normalizer.normalize(&json!(-57)), Some(26.1));

        let normalizer =
            TemperatureNormalizer::new(&StandardScaleConverter, TemperatureScale::Fahrenheit);
        assert_eq!(normalizer.normalize(&json!("-57")), Some(79.0));
    }

    #[test]
    fn test_uncoercible_is_none() {
        let normalizer = TemperatureNormalizer::new(&StandardScaleConverter, TemperatureScale::Celsius);
        assert_eq!(normalizer.normalize(&json!("warm")), None);
        assert_eq!(normalizer.normalize(&json!(true)), None);
        assert_eq!(normalizer.normalize(&json!({"c": 1})), None);
    }

    #[test]
    fn test_converter_failure_falls_back_to_celsius() {
        let mut converter = MockScaleConverter::new();
        converter
            .expect_convert()
            .times(1)
            .returning(|_, _| Err(BridgeError::conversion("unsupported")));

        let normalizer = TemperatureNormalizer::new(&converter, TemperatureScale::Fahrenheit);
        assert_eq!(normalizer.normalize(&json!(21.5)), Some(21.5));
    }
}
