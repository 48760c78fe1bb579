use proptest::prelude::*;
use tagwatch::{evaluate, AlarmRule, DecodedValue, TagRegistry};

proptest! {
    #[test]
    fn test_high_threshold_iff_at_or_above(value in any::<f32>(), threshold in -1.0e6f32..1.0e6) {
        let fired = evaluate(Some(&AlarmRule::HighThreshold(threshold)), &DecodedValue::Real(value));
        prop_assert_eq!(fired, value >= threshold);
    }

    #[test]
    fn test_configured_limit_always_fires_at_boundary(limit in -1.0e6f64..1.0e6) {
        // the controller holds the limit as a REAL, whatever decimal was configured
        let doc = format!(
            r#"{{"tags": [{{"name": "T1", "db": 24, "start": 0, "type": "REAL", "alarm_high": {}}}]}}"#,
            limit
        );
        let registry = TagRegistry::from_json_str(&doc).unwrap();
        let rule = registry.get("T1").unwrap().alarm_rule;
        prop_assert!(evaluate(rule.as_ref(), &DecodedValue::Real(limit as f32)));
    }

    #[test]
    fn test_match_boolean_is_equality(value in any::<bool>(), expected in any::<bool>()) {
        let fired = evaluate(Some(&AlarmRule::MatchBoolean(expected)), &DecodedValue::Bool(value));
        prop_assert_eq!(fired, value == expected);
    }

    #[test]
    fn test_no_rule_never_fires(value in any::<f32>(), flag in any::<bool>()) {
        prop_assert!(!evaluate(None, &DecodedValue::Real(value)));
        prop_assert!(!evaluate(None, &DecodedValue::Bool(flag)));
    }
}
