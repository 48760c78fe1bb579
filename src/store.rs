// src/store.rs - Append-only reading log on SQLite

use crate::{
    error::StoreError,
    reading::{format_timestamp, parse_timestamp, Reading, StoredReading},
};
use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        name TEXT NOT NULL,
        value REAL NOT NULL,
        alarm INTEGER NOT NULL,
        acknowledged INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
"#;

type RawRow = (i64, String, String, f64, i64, i64);

/// SQL function mapping any accepted timestamp text to its canonical
/// fixed-width form, NULL when unparseable. Time comparisons and ordering go
/// through it so rows written in older layouts sort with the rest.
const TS_KEY_FN: &str = "tagwatch_ts";

/// Rows with their canonical time key as `ts_key`.
const KEYED_LOGS: &str = "(SELECT id, timestamp, name, value, alarm, acknowledged, \
     tagwatch_ts(timestamp) AS ts_key FROM logs)";

/// Durable, process-wide reading log.
///
/// Every append is a single INSERT, so a reading is either fully stored or
/// not at all. Rows are never updated by the engine; only
/// [`LogStore::acknowledge`] flips the acknowledgment flag, and never back.
/// Content is not deduplicated: two identical appends are two rows.
#[derive(Clone)]
pub struct LogStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl LogStore {
    /// Open or create the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        register_functions(&conn)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        "#,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;

        info!("Reading log opened at {:?}", path);
        Ok(store)
    }

    /// Private in-memory log, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        register_functions(&conn)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create the table and index if missing. A no-op on an existing schema.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert one reading and return its row id.
    pub fn append(&self, reading: &Reading) -> Result<i64, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO logs (timestamp, name, value, alarm, acknowledged) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                format_timestamp(&reading.timestamp),
                reading.tag_name,
                reading.value,
                i64::from(reading.alarm),
                i64::from(reading.acknowledged),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, tag = %reading.tag_name, "Appended reading");
        Ok(id)
    }

    /// The `limit` most recent rows, newest first.
    pub fn query_recent(&self, limit: usize) -> Result<Vec<StoredReading>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, timestamp, name, value, alarm, acknowledged FROM {} \
             ORDER BY ts_key DESC, id DESC LIMIT ?1",
            KEYED_LOGS
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(to_stored).collect()
    }

    /// Rows with `start <= timestamp <= end`, oldest first.
    pub fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, timestamp, name, value, alarm, acknowledged FROM {} \
             WHERE ts_key >= ?1 AND ts_key <= ?2 \
             ORDER BY ts_key ASC, id ASC",
            KEYED_LOGS
        ))?;
        let rows = stmt
            .query_map(params![format_timestamp(&start), format_timestamp(&end)], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(to_stored).collect()
    }

    /// Mark one row acknowledged. Returns whether the row exists.
    pub fn acknowledge(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self
            .lock()
            .execute("UPDATE logs SET acknowledged = 1 WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Distinct tag names present in the log, sorted.
    pub fn tag_names(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT name FROM logs ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn register_functions(conn: &Connection) -> Result<(), StoreError> {
    conn.create_scalar_function(
        TS_KEY_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let key = match ctx.get_raw(0) {
                ValueRef::Text(text) => std::str::from_utf8(text)
                    .ok()
                    .and_then(|text| parse_timestamp(text).ok())
                    .map(|ts| format_timestamp(&ts)),
                _ => None,
            };
            Ok(key)
        },
    )?;
    Ok(())
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn to_stored((id, ts, name, value, alarm, acknowledged): RawRow) -> Result<StoredReading, StoreError> {
    Ok(StoredReading {
        id,
        reading: Reading {
            timestamp: parse_timestamp(&ts)?,
            tag_name: name,
            value,
            alarm: alarm != 0,
            acknowledged: acknowledged != 0,
        },
    })
}
