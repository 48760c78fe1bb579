// src/latest.rs - Most recent committed value per tag
use crate::value::DecodedValue;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

/// Latest committed value of a tag together with its capture time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestValue {
    pub value: DecodedValue,
    pub timestamp: DateTime<Utc>,
}

/// Thread-safe map of the last value committed for each tag.
///
/// The scheduler records a value only after the reading was persisted, so
/// the map never runs ahead of the log. A tag that failed this cycle keeps
/// its previous entry; consumers compare `timestamp` to spot stale data.
///
/// # Examples
///
/// ```rust
/// use tagwatch::{DecodedValue, LatestValues};
///
/// let latest = LatestValues::new();
/// latest.record("T1", DecodedValue::Real(21.5), chrono::Utc::now());
/// assert_eq!(latest.get("T1").map(|v| v.value), Some(DecodedValue::Real(21.5)));
/// assert!(latest.get("T2").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LatestValues {
    values: Arc<DashMap<String, LatestValue>>,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: impl AsRef<str>, value: DecodedValue, timestamp: DateTime<Utc>) {
        let name = name.as_ref();
        trace!("Latest {} = {}", name, value);
        self.values
            .insert(name.to_string(), LatestValue { value, timestamp });
    }

    pub fn get(&self, name: &str) -> Option<LatestValue> {
        self.values.get(name).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot sorted by tag name.
    pub fn snapshot(&self) -> Vec<(String, LatestValue)> {
        let mut all: Vec<_> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
