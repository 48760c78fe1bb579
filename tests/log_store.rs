// tests/log_store.rs
use chrono::{TimeZone, Utc};
use std::time::Duration;
use tagwatch::{LogStore, Reading};

fn open(path: &std::path::Path) -> LogStore {
    LogStore::open(path, Duration::from_millis(500)).unwrap()
}

#[test]
fn test_rows_and_acks_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_log.db");
    let ts = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();

    let id = {
        let store = open(&path);
        store.append(&Reading::new(ts, "T1", 37.5, true)).unwrap();
        store.append(&Reading::new(ts, "Door1", 1.0, true)).unwrap()
    };

    let store = open(&path);
    assert!(store.acknowledge(id).unwrap());
    drop(store);

    let store = open(&path);
    let rows = store.query_recent(10).unwrap();
    assert_eq!(rows.len(), 2);
    let door = rows.iter().find(|r| r.id == id).unwrap();
    assert!(door.reading.acknowledged);
    assert_eq!(store.tag_names().unwrap(), vec!["Door1", "T1"]);
}

#[test]
fn test_rows_written_by_older_loggers_are_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_log.db");
    let store = open(&path);

    let legacy = rusqlite::Connection::open(&path).unwrap();
    legacy
        .execute(
            "INSERT INTO logs (timestamp, name, value, alarm, acknowledged) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params!["2025-07-02 10:15:30.250000", "T1", 21.0, 0, 0],
        )
        .unwrap();

    let rows = store.query_recent(1).unwrap();
    assert_eq!(
        rows[0].reading.timestamp,
        Utc.with_ymd_and_hms(2025, 7, 2, 10, 15, 30).unwrap() + chrono::Duration::milliseconds(250)
    );
    assert_eq!(rows[0].reading.value, 21.0);
}

#[test]
fn test_two_handles_share_one_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_log.db");
    let writer = open(&path);
    let reader = open(&path);
    let ts = Utc::now();

    let a = writer.append(&Reading::new(ts, "T1", 1.0, false)).unwrap();
    let b = writer.append(&Reading::new(ts, "T1", 1.0, false)).unwrap();
    assert_ne!(a, b);
    assert_eq!(reader.count().unwrap(), 2);
}

fn insert_raw(path: &std::path::Path, timestamp: &str, name: &str, value: f64) {
    let legacy = rusqlite::Connection::open(path).unwrap();
    legacy
        .execute(
            "INSERT INTO logs (timestamp, name, value, alarm, acknowledged) VALUES (?1, ?2, ?3, 0, 0)",
            rusqlite::params![timestamp, name, value],
        )
        .unwrap();
}

#[test]
fn test_range_bounds_include_legacy_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_log.db");
    let store = open(&path);
    // isoformat() drops the fraction when it is zero
    insert_raw(&path, "2026-10-18T08:00:00", "T1", 1.0);
    insert_raw(&path, "2026-10-18 08:00:05.5", "T1", 2.0);
    store
        .append(&Reading::new(Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 2).unwrap(), "T1", 3.0, false))
        .unwrap();

    let at = |s| Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, s).unwrap();
    let exact = store.query_range(at(0), at(0)).unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].reading.value, 1.0);

    let values: Vec<f64> = store
        .query_range(at(0), at(6))
        .unwrap()
        .iter()
        .map(|r| r.reading.value)
        .collect();
    assert_eq!(values, vec![1.0, 3.0, 2.0]);
}

#[test]
fn test_recent_orders_legacy_rows_by_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_log.db");
    let store = open(&path);
    insert_raw(&path, "2026-10-18 09:00:00", "T1", 9.0);
    store
        .append(&Reading::new(Utc.with_ymd_and_hms(2026, 10, 18, 8, 30, 0).unwrap(), "T3", 8.5, false))
        .unwrap();

    let recent = store.query_recent(2).unwrap();
    assert_eq!(recent[0].reading.tag_name, "T1");
    assert_eq!(
        recent[0].reading.timestamp,
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    );
    assert_eq!(recent[1].reading.tag_name, "T3");
}

#[test]
fn test_concurrent_appends_are_whole_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir.path().join("data_log.db"));
    let ts = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|w| {
            let store = store.clone();
            std::thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        let value = (w * 1000 + i) as f64;
                        store
                            .append(&Reading::new(ts, format!("W{}", w), value, i % 2 == 0))
                            .unwrap()
                    })
                    .collect::<Vec<i64>>()
            })
        })
        .collect();

    let mut ids: Vec<i64> = workers.into_iter().flat_map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 400);
    assert_eq!(store.count().unwrap(), 400);

    let rows = store.query_recent(1000).unwrap();
    assert_eq!(rows.len(), 400);
    for row in &rows {
        let r = &row.reading;
        let worker = (r.value as i64) / 1000;
        let index = (r.value as i64) % 1000;
        assert_eq!(r.tag_name, format!("W{}", worker));
        assert_eq!(r.alarm, index % 2 == 0);
        assert_eq!(r.timestamp, ts);
        assert!(!r.acknowledged);
    }
}
