use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tagwatch::{LogStore, Reading};

fn at(offset: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(offset)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_range_is_inclusive_and_ascending(
        offsets in prop::collection::vec(0i64..10_000, 1..40),
        a in 0i64..10_000,
        b in 0i64..10_000,
    ) {
        let store = LogStore::open_in_memory().unwrap();
        for (i, offset) in offsets.iter().enumerate() {
            store.append(&Reading::new(at(*offset), format!("T{}", i % 3), *offset as f64, false)).unwrap();
        }
        let (start, end) = (a.min(b), a.max(b));
        let rows = store.query_range(at(start), at(end)).unwrap();

        let expected = offsets.iter().filter(|o| (start..=end).contains(*o)).count();
        prop_assert_eq!(rows.len(), expected);
        prop_assert!(rows.iter().all(|r| r.reading.timestamp >= at(start) && r.reading.timestamp <= at(end)));
        prop_assert!(rows.windows(2).all(|w| w[0].reading.timestamp <= w[1].reading.timestamp));
    }

    #[test]
    fn test_append_then_recent_returns_it(value in -1.0e9f64..1.0e9, alarm in any::<bool>(), offset in 0i64..1_000_000) {
        let store = LogStore::open_in_memory().unwrap();
        store.append(&Reading::new(at(0), "older", 0.0, false)).unwrap();
        let reading = Reading::new(at(offset + 1), "T1", value, alarm);
        let id = store.append(&reading).unwrap();

        let recent = store.query_recent(1).unwrap();
        prop_assert_eq!(recent.len(), 1);
        prop_assert_eq!(recent[0].id, id);
        prop_assert_eq!(&recent[0].reading, &reading);
    }
}
