// src/value.rs - Typed values produced by the decoder
use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller data types a tag can be declared with.
///
/// Names follow the controller's own spelling in tag files (`REAL`, `BOOL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// 32-bit IEEE-754 float, big-endian on the wire
    #[serde(rename = "REAL")]
    Float32,
    /// One bit inside a byte
    #[serde(rename = "BOOL")]
    Boolean,
}

impl ValueType {
    /// Number of bytes the reader must fetch for this type.
    pub fn byte_len(self) -> usize {
        match self {
            ValueType::Float32 => 4,
            ValueType::Boolean => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Float32 => "REAL",
            ValueType::Boolean => "BOOL",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded register value.
///
/// # Examples
///
/// ```rust
/// use tagwatch::DecodedValue;
///
/// assert_eq!(DecodedValue::Bool(true).as_f64(), 1.0);
/// assert_eq!(DecodedValue::Real(37.5).as_f64(), 37.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum DecodedValue {
    Real(f32),
    Bool(bool),
}

impl DecodedValue {
    /// Numeric form persisted in the log; booleans become 0/1.
    pub fn as_f64(&self) -> f64 {
        match self {
            DecodedValue::Real(v) => *v as f64,
            DecodedValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DecodedValue::Bool(b) => Some(*b),
            DecodedValue::Real(_) => None,
        }
    }

    pub fn as_real(&self) -> Option<f32> {
        match self {
            DecodedValue::Real(v) => Some(*v),
            DecodedValue::Bool(_) => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            DecodedValue::Real(_) => ValueType::Float32,
            DecodedValue::Bool(_) => ValueType::Boolean,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Real(v) => write!(f, "{}", v),
            DecodedValue::Bool(b) => write!(f, "{}", u8::from(*b)),
        }
    }
}
