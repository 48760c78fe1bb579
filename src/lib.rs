//! TAGWATCH - Tag-driven PLC polling and alarm logging
//!
//! Reads a configured set of named tags from a Siemens S7 controller on a
//! fixed cadence, decodes the raw register bytes into typed values, checks
//! each value against its alarm rule and appends every reading to a durable
//! SQLite log.
//!
//! # Pipeline
//!
//! ```text
//! TagRegistry -> RegisterReader -> decode -> alarm::evaluate -> LogStore
//!                      ^                                           |
//!                      +------------- Engine (poll cycle) ---------+
//! ```
//!
//! # Feature Flags
//!
//! - `s7-support`: real controller transport through the `s7` crate. Without
//!   it only the simulated backend is available.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tagwatch::{
//!     config::EngineConfig, reader::RegisterReader, transport::SimulatedController,
//!     Engine, LogStore, TagRegistry,
//! };
//!
//! # tokio_test::block_on(async {
//! let registry = TagRegistry::from_json_str(
//!     r#"{"tags": [{"name": "T1", "db": 24, "start": 0, "type": "REAL", "alarm_high": 36}]}"#,
//! )?;
//! let (plc, handle) = SimulatedController::for_registry(&registry, false);
//! handle.set_real(24, 0, 37.5);
//!
//! let reader = Arc::new(RegisterReader::new(Box::new(plc), Duration::from_secs(1)));
//! let engine = Engine::new(registry, reader, LogStore::open_in_memory()?, EngineConfig::default());
//! engine.run_cycle().await;
//!
//! let row = &engine.store().query_recent(1)?[0];
//! assert!(row.reading.alarm);
//! # Ok::<(), tagwatch::PlcError>(())
//! # }).unwrap();
//! ```

// ============================================================================
// CORE MODULES
// ============================================================================

/// Error types shared by every stage
pub mod error;

/// Tag value types and decoded values
pub mod value;

/// Tag definitions and the validated registry
pub mod tags;

/// Alarm rules and their evaluation
pub mod alarm;

/// Big-endian register decoding
pub mod decode;

/// Readings, timestamps and the cycle clock
pub mod reading;

/// Most recent committed value per tag
pub mod latest;

/// YAML/JSON configuration
pub mod config;

// ============================================================================
// CONTROLLER ACCESS
// ============================================================================

/// Controller transports (S7 and simulated)
pub mod transport;

/// Session ownership, reconnects and read timeouts
pub mod reader;

/// Alarm setpoint block access
pub mod setpoint;

// ============================================================================
// STORAGE AND SCHEDULING
// ============================================================================

/// SQLite reading log
pub mod store;

/// Poll cycle scheduler
pub mod engine;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use alarm::{evaluate, AlarmRule};
pub use config::Config;
pub use decode::decode;
pub use engine::{CycleReport, Engine, EngineStats, TagOutcome};
pub use error::{
    ConfigError, ConnectionError, DecodeError, PlcError, ReadError, Result, StoreError,
};
pub use latest::LatestValues;
pub use reading::{Reading, StoredReading};
pub use store::LogStore;
pub use tags::{TagDefinition, TagRegistry};
pub use value::{DecodedValue, ValueType};

// ============================================================================
// VERSION INFORMATION
// ============================================================================

/// TAGWATCH version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build timestamp
pub const BUILD_TIMESTAMP: &str = env!("TAGWATCH_BUILD_TIMESTAMP");

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `tagwatch=info` is used. Calling this
/// twice is harmless.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn").add_directive(default_directive()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

fn default_directive() -> tracing_subscriber::filter::Directive {
    // Static string, always parses
    "tagwatch=info"
        .parse()
        .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into())
}
