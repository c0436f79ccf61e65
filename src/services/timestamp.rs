//! Timestamp normalization
//!
//! Devices report times as epoch seconds, epoch milliseconds, numeric
//! strings or one of several ISO-8601 spellings. Parsed values are rendered
//! with the host's display pattern; anything unparseable is passed through
//! verbatim so a human still sees what the device sent.

use crate::services::collaborators::DisplayFormat;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use std::fmt::Write;
use tracing::debug;

/// Epoch values above this are taken to be milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 100_000_000_000.0;

/// Zone-less layouts tried after RFC 3339, interpreted as UTC
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Layouts carrying a numeric offset without a colon (`+0200`)
const OFFSET_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse a raw timestamp into UTC
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return s.parse::<f64>().ok().and_then(from_epoch);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for layout in OFFSET_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(s, layout) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    let naive = s.trim_end_matches('Z');
    for layout in NAIVE_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, layout) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    None
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let millis = if value >= EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    DateTime::from_timestamp_millis(millis.round() as i64)
}

/// Render a parsed timestamp with the display pattern
pub fn format_timestamp(dt: &DateTime<Utc>, display: &dyn DisplayFormat) -> String {
    let local = dt.with_timezone(&display.timezone());
    let mut out = String::new();
    if write!(out, "{}", local.format(display.date_pattern())).is_err() {
        let pattern = display.date_pattern();
        debug!(pattern, "Invalid date pattern, falling back to RFC 3339");
        return local.to_rfc3339();
    }
    out
}

/// Normalize a raw timestamp for display
///
/// Returns `None` only when no timestamp was present. Values that cannot
/// be parsed come back as their raw string form.
pub fn normalize_timestamp(raw: &Value, display: &dyn DisplayFormat) -> Option<String> {
    match raw {
        Value::Null => None,
        _ => match parse_timestamp(raw) {
            Some(dt) => Some(format_timestamp(&dt, display)),
            None => {
                debug!("Unparseable timestamp {raw}, passing through");
                Some(match raw {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayConfig;
    use rstest::rstest;
    use serde_json::json;

    fn display() -> DisplayConfig {
        DisplayConfig::default()
    }

    #[rstest]
    #[case(json!(1_700_000_000), "2023-11-14 22:13:20")]
    #[case(json!(1_700_000_000_000_i64), "2023-11-14 22:13:20")]
    #[case(json!("1700000000"), "2023-11-14 22:13:20")]
    #[case(json!("1700000000000"), "2023-11-14 22:13:20")]
    #[case(json!("2023-11-14T22:13:20Z"), "2023-11-14 22:13:20")]
    #[case(json!("2023-11-14T22:13:20.123Z"), "2023-11-14 22:13:20")]
    #[case(json!("2023-11-15T00:13:20+02:00"), "2023-11-14 22:13:20")]
    #[case(json!("2023-11-15T00:13:20+0200"), "2023-11-14 22:13:20")]
    #[case(json!("2023-11-14T22:13:20"), "2023-11-14 22:13:20")]
    #[case(json!("2023-11-14 22:13:20"), "2023-11-14 22:13:20")]
    fn test_normalize_variants(#[case] raw: Value, #[case] expected: &str) {
        assert_eq!(
            normalize_timestamp(&raw, &display()).as_deref(),
            Some(expected)
        );
    }

    #[test]
    fn test_unparseable_passes_through() {
        assert_eq!(
            normalize_timestamp(&json!("yesterday-ish"), &display()).as_deref(),
            Some("yesterday-ish")
        );
    }

    #[test]
    fn test_null_is_absent() {
        assert_eq!(normalize_timestamp(&Value::Null, &display()), None);
    }

    #[test]
    fn test_display_pattern_and_offset() {
        let display = DisplayConfig {
            date_format: "%d/%m/%Y %H:%M".to_string(),
            utc_offset_minutes: 60,
            ..DisplayConfig::default()
        };
        assert_eq!(
            normalize_timestamp(&json!(1_700_000_000), &display).as_deref(),
            Some("14/11/2023 23:13")
        );
    }

    #[test]
    fn test_invalid_pattern_falls_back_to_rfc3339() {
        let display = DisplayConfig {
            date_format: "%Q".to_string(),
            ..DisplayConfig::default()
        };
        let rendered = normalize_timestamp(&json!(1_700_000_000), &display).unwrap();
        assert!(rendered.starts_with("2023-11-14T22:13:20"), "{rendered}");
    }
}
