// src/error.rs
use thiserror::Error;

/// Invalid tag set or engine configuration. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Cannot read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Error while parsing JSON tag files
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tag #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("Duplicate tag name '{0}'")]
    DuplicateName(String),

    /// Alarm rule kind does not fit the tag's value type
    #[error("Tag '{tag}': {rule} is not allowed on a {value_type} tag")]
    IncompatibleRule {
        tag: String,
        rule: &'static str,
        value_type: &'static str,
    },

    #[error("Tag '{tag}': alarm_high and alarm_if are mutually exclusive")]
    ConflictingRules { tag: String },

    #[error("Tag '{tag}': {reason}")]
    InvalidAddress { tag: String, reason: String },

    #[error("Tag '{tag}': alarm threshold must be finite")]
    NonFiniteThreshold { tag: String },

    /// Any other inconsistent setting
    #[error("Configuration error: {0}")]
    Invalid(String),
}

/// Failure establishing the controller session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Controller unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Connecting to {address} timed out")]
    Timeout { address: String },

    #[error("Invalid controller address '{0}'")]
    InvalidAddress(String),
}

/// Failure reading a block from the controller. Recoverable per cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Read timed out after {0} ms")]
    Timeout(u64),

    #[error("Protocol fault: {0}")]
    ProtocolFault(String),
}

impl ReadError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReadError::ConnectionLost(_) => "connection_lost",
            ReadError::Timeout(_) => "timeout",
            ReadError::ProtocolFault(_) => "protocol_fault",
        }
    }
}

impl From<ConnectionError> for ReadError {
    fn from(e: ConnectionError) -> Self {
        ReadError::ConnectionLost(e.to_string())
    }
}

/// Buffer shape did not match the tag's type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Bit offset {0} is outside 0..=7")]
    BitOutOfRange(u8),
}

/// Durable log failure. Reported, never retried within the cycle.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored timestamp '{0}' is not RFC 3339")]
    BadTimestamp(String),

    #[error("Store worker failed: {0}")]
    Worker(String),
}

/// Application level error type used throughout the crate.
#[derive(Error, Debug)]
pub enum PlcError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Poll engine is already running")]
    AlreadyRunning,
}

impl PlcError {
    /// Short machine-friendly label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PlcError::Config(_) => "config",
            PlcError::Connection(_) => "connection",
            PlcError::Read(e) => e.kind(),
            PlcError::Decode(_) => "decode",
            PlcError::Store(_) => "store",
            PlcError::AlreadyRunning => "scheduler",
        }
    }
}

/// Convenient alias over [`Result`] using [`PlcError`]
pub type Result<T> = std::result::Result<T, PlcError>;
