//! Motion state derivation
//!
//! Firmware variants signal motion through an explicit `motion` field
//! (bool, number or string), through the device state string, or through
//! an `alarm.motion` flag nested in the state block. The first usable
//! signal wins; no signal at all means inactive.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const ACTIVE_WORDS: &[&str] = &["true", "active", "motion", "detected", "1"];
const INACTIVE_WORDS: &[&str] = &["false", "inactive", "clear", "0", "none"];

/// Canonical motion state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Active,
    #[default]
    Inactive,
}

impl MotionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::Active => "active",
            MotionState::Inactive => "inactive",
        }
    }

    fn from_flag(flag: bool) -> Self {
        if flag {
            MotionState::Active
        } else {
            MotionState::Inactive
        }
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpret an explicit motion value, `None` when it carries no signal
fn explicit_motion(value: &Value) -> Option<MotionState> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(MotionState::from_flag(*b)),
        Value::Number(n) => n.as_f64().map(|f| MotionState::from_flag(f != 0.0)),
        Value::String(s) => word_motion(s),
        other => word_motion(&other.to_string()),
    }
}

fn word_motion(text: &str) -> Option<MotionState> {
    let lowered = text.trim().to_lowercase();
    if ACTIVE_WORDS.contains(&lowered.as_str()) {
        Some(MotionState::Active)
    } else if INACTIVE_WORDS.contains(&lowered.as_str()) {
        Some(MotionState::Inactive)
    } else {
        None
    }
}

/// Derive the motion state from every available signal
pub fn derive_motion(
    motion_value: Option<&Value>,
    state_str: Option<&str>,
    state_block: Option<&Value>,
) -> MotionState {
    if let Some(state) = motion_value.and_then(explicit_motion) {
        return state;
    }

    if state_str.is_some_and(|s| s.trim().eq_ignore_ascii_case("alert")) {
        return MotionState::Active;
    }

    let alarm_motion = state_block
        .and_then(|block| block.get("alarm"))
        .and_then(|alarm| alarm.get("motion"))
        .and_then(Value::as_bool);
    if alarm_motion == Some(true) {
        return MotionState::Active;
    }

    MotionState::Inactive
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(true), MotionState::Active)]
    #[case(json!(false), MotionState::Inactive)]
    #[case(json!(1), MotionState::Active)]
    #[case(json!(0.0), MotionState::Inactive)]
    #[case(json!(-2), MotionState::Active)]
    #[case(json!("Detected"), MotionState::Active)]
    #[case(json!(" motion "), MotionState::Active)]
    #[case(json!("CLEAR"), MotionState::Inactive)]
    #[case(json!("none"), MotionState::Inactive)]
    #[case(json!("0"), MotionState::Inactive)]
    fn test_explicit_signal(#[case] value: Value, #[case] expected: MotionState) {
        assert_eq!(derive_motion(Some(&value), None, None), expected);
    }

    #[test]
    fn test_explicit_signal_beats_alert_state() {
        let value = json!(false);
        assert_eq!(
            derive_motion(Some(&value), Some("alert"), None),
            MotionState::Inactive
        );
    }

    #[test]
    fn test_unrecognized_word_falls_through_to_state() {
        let value = json!("maybe");
        assert_eq!(
            derive_motion(Some(&value), Some("Alert"), None),
            MotionState::Active
        );
        assert_eq!(
            derive_motion(Some(&value), Some("normal"), None),
            MotionState::Inactive
        );
    }

    #[test]
    fn test_alarm_flag() {
        let block = json!({"alarm": {"motion": true}});
        assert_eq!(derive_motion(None, Some("normal"), Some(&block)), MotionState::Active);

        let block = json!({"alarm": {"motion": "true"}});
        assert_eq!(derive_motion(None, None, Some(&block)), MotionState::Inactive);
    }

    #[test]
    fn test_derivation_is_total() {
        let values = [
            None,
            Some(json!(null)),
            Some(json!([1, 2])),
            Some(json!({"x": 1})),
            Some(json!("")),
        ];
        let states = [None, Some("alert"), Some(""), Some("normal")];
        let blocks = [None, Some(json!(null)), Some(json!({"alarm": null})), Some(json!("str"))];

        for value in &values {
            for state in &states {
                for block in &blocks {
                    let result = derive_motion(value.as_ref(), *state, block.as_ref());
                    assert!(matches!(result, MotionState::Active | MotionState::Inactive));
                }
            }
        }
        assert_eq!(derive_motion(None, None, None), MotionState::Inactive);
    }
}
