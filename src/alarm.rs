// src/alarm.rs
// Per-tag alarm evaluation.
//
// Evaluation is a pure function of (rule, value). No state is carried between
// cycles, so there is no hysteresis, delay or latching here.

use crate::{latest::LatestValues, value::DecodedValue};
use serde::{Deserialize, Serialize};

/// Alarm condition attached to a tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmRule {
    /// Alarm when value >= threshold. REAL tags only; the threshold is held
    /// at the tag's own precision so a value equal to the configured limit
    /// fires.
    HighThreshold(f32),

    /// Alarm when the bit equals the expected state. BOOL tags only.
    MatchBoolean(bool),
}

impl AlarmRule {
    pub fn kind(&self) -> &'static str {
        match self {
            AlarmRule::HighThreshold(_) => "high_threshold",
            AlarmRule::MatchBoolean(_) => "match_boolean",
        }
    }
}

/// Apply `rule` to `value`. A missing rule never alarms.
///
/// A rule paired with the wrong value kind also yields `false`; the registry
/// rejects such pairings at load time.
///
/// # Examples
///
/// ```rust
/// use tagwatch::{evaluate, AlarmRule, DecodedValue};
///
/// let rule = AlarmRule::HighThreshold(36.0);
/// assert!(evaluate(Some(&rule), &DecodedValue::Real(36.0)));
/// assert!(!evaluate(Some(&rule), &DecodedValue::Real(35.9)));
/// assert!(!evaluate(None, &DecodedValue::Real(1000.0)));
/// ```
pub fn evaluate(rule: Option<&AlarmRule>, value: &DecodedValue) -> bool {
    match (rule, value) {
        (Some(AlarmRule::HighThreshold(threshold)), DecodedValue::Real(v)) => v >= threshold,
        (Some(AlarmRule::MatchBoolean(expected)), DecodedValue::Bool(v)) => v == expected,
        _ => false,
    }
}

/// Compare a live value against another tag's most recent reading.
///
/// This is the composed form of [`AlarmRule::HighThreshold`]: the reference
/// tag's latest value is looked up explicitly and used as the threshold.
/// Returns `None` when the reference tag has not produced a value yet, so a
/// missing setpoint is never mistaken for "not in alarm".
pub fn evaluate_against(
    value: &DecodedValue,
    latest: &LatestValues,
    reference_tag: &str,
) -> Option<bool> {
    let reference = latest.get(reference_tag)?;
    let threshold = match reference.value {
        DecodedValue::Real(v) => v,
        DecodedValue::Bool(b) => f32::from(u8::from(b)),
    };
    let rule = AlarmRule::HighThreshold(threshold);
    Some(evaluate(Some(&rule), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_high_threshold_boundary_fires() {
        let rule = AlarmRule::HighThreshold(36.0);
        assert!(evaluate(Some(&rule), &DecodedValue::Real(36.0)));
        assert!(evaluate(Some(&rule), &DecodedValue::Real(37.5)));
        assert!(!evaluate(Some(&rule), &DecodedValue::Real(35.99)));
    }

    #[test]
    fn test_high_threshold_nan_value_never_alarms() {
        let rule = AlarmRule::HighThreshold(0.0);
        assert!(!evaluate(Some(&rule), &DecodedValue::Real(f32::NAN)));
    }

    #[test]
    fn test_configured_limit_fires_at_tag_precision() {
        let registry = crate::TagRegistry::from_yaml_str(
            "tags:\n  - { name: T1, db: 24, start: 0, type: REAL, alarm_high: 36.1 }\n",
        )
        .unwrap();
        let rule = registry.get("T1").unwrap().alarm_rule;
        assert!(evaluate(rule.as_ref(), &DecodedValue::Real(36.1)));
        assert!(evaluate(rule.as_ref(), &DecodedValue::Real(40.2)));
        assert!(!evaluate(rule.as_ref(), &DecodedValue::Real(36.09)));
    }

    #[test]
    fn test_match_boolean() {
        let open = AlarmRule::MatchBoolean(true);
        assert!(evaluate(Some(&open), &DecodedValue::Bool(true)));
        assert!(!evaluate(Some(&open), &DecodedValue::Bool(false)));

        let closed = AlarmRule::MatchBoolean(false);
        assert!(evaluate(Some(&closed), &DecodedValue::Bool(false)));
    }

    #[test]
    fn test_no_rule_never_alarms() {
        assert!(!evaluate(None, &DecodedValue::Bool(true)));
        assert!(!evaluate(None, &DecodedValue::Real(f32::MAX)));
    }

    #[test]
    fn test_mismatched_rule_is_false() {
        let rule = AlarmRule::HighThreshold(0.0);
        assert!(!evaluate(Some(&rule), &DecodedValue::Bool(true)));
    }

    #[test]
    fn test_against_reference_tag() {
        let latest = LatestValues::new();
        let temp = DecodedValue::Real(5.0);
        assert_eq!(evaluate_against(&temp, &latest, "Setpoint1"), None);

        latest.record("Setpoint1", DecodedValue::Real(4.0), Utc::now());
        assert_eq!(evaluate_against(&temp, &latest, "Setpoint1"), Some(true));

        latest.record("Setpoint1", DecodedValue::Real(8.0), Utc::now());
        assert_eq!(evaluate_against(&temp, &latest, "Setpoint1"), Some(false));
    }
}
