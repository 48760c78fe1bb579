// src/reading.rs - Observations and their timestamps
use crate::error::StoreError;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One observation of one tag in one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "name")]
    pub tag_name: String,
    pub value: f64,
    pub alarm: bool,
    pub acknowledged: bool,
}

impl Reading {
    /// New, unacknowledged reading.
    pub fn new(timestamp: DateTime<Utc>, tag_name: impl Into<String>, value: f64, alarm: bool) -> Self {
        Self {
            timestamp,
            tag_name: tag_name.into(),
            value,
            alarm,
            acknowledged: false,
        }
    }
}

/// A reading as it sits in the log, with the row id the store assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub id: i64,
    #[serde(flatten)]
    pub reading: Reading,
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Hands out capture instants that never go backwards.
///
/// Wall-clock steps (NTP corrections, manual changes) are absorbed by
/// repeating the last issued instant until real time catches up. Instants are
/// truncated to microseconds, the precision of the stored text form.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    /// Clamp an externally supplied instant against the last one issued.
    pub fn observe(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let instant = instant.trunc_subsecs(6);
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let issued = match *last {
            Some(prev) if prev > instant => prev,
            _ => instant,
        };
        *last = Some(issued);
        issued
    }
}

/// Fixed-width RFC 3339 text, so lexical order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Offset-less ISO-8601 text (as written by older
/// loggers) is read as UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| StoreError::BadTimestamp(text.to_string()))
}
