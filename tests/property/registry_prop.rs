use proptest::prelude::*;
use std::collections::HashSet;
use tagwatch::{ConfigError, TagRegistry};

fn document(names: &[String]) -> String {
    let tags: Vec<String> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!(
                r#"{{"name": "{}", "db": 24, "start": {}, "type": "REAL"}}"#,
                name,
                i * 4
            )
        })
        .collect();
    format!(r#"{{"tags": [{}]}}"#, tags.join(","))
}

proptest! {
    #[test]
    fn test_loaded_names_are_unique(names in prop::collection::vec("[a-d]{1,2}", 1..12)) {
        let distinct: HashSet<&String> = names.iter().collect();
        match TagRegistry::from_json_str(&document(&names)) {
            Ok(registry) => {
                prop_assert_eq!(distinct.len(), names.len());
                let loaded: HashSet<&str> = registry.iter().map(|t| t.name.as_str()).collect();
                prop_assert_eq!(loaded.len(), registry.len());
            }
            Err(ConfigError::DuplicateName(_)) => prop_assert!(distinct.len() < names.len()),
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    #[test]
    fn test_bit_offsets_above_seven_rejected(bit in 8u8..=255) {
        let doc = format!(
            r#"{{"tags": [{{"name": "D", "db": 25, "start": 0, "type": "BOOL", "bit": {}}}]}}"#,
            bit
        );
        let is_invalid_address = matches!(
            TagRegistry::from_json_str(&doc),
            Err(ConfigError::InvalidAddress { .. })
        );
        prop_assert!(is_invalid_address);
    }
}
