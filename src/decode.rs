// src/decode.rs - Raw controller bytes to typed values
use crate::{error::DecodeError, value::{DecodedValue, ValueType}};

/// Decode the bytes fetched for one tag.
///
/// REAL takes exactly four bytes, big-endian IEEE-754. BOOL takes exactly one
/// byte and extracts `bit` (0..=7, LSB is bit 0). The length is checked even
/// though the reader is asked for the right size.
///
/// # Examples
///
/// ```rust
/// use tagwatch::{decode, DecodedValue, ValueType};
///
/// let v = decode(ValueType::Float32, &37.5f32.to_be_bytes(), None)?;
/// assert_eq!(v, DecodedValue::Real(37.5));
///
/// let v = decode(ValueType::Boolean, &[0b0000_0100], Some(2))?;
/// assert_eq!(v, DecodedValue::Bool(true));
/// # Ok::<(), tagwatch::DecodeError>(())
/// ```
pub fn decode(value_type: ValueType, bytes: &[u8], bit: Option<u8>) -> Result<DecodedValue, DecodeError> {
    let expected = value_type.byte_len();
    if bytes.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    match value_type {
        ValueType::Float32 => {
            let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
            Ok(DecodedValue::Real(f32::from_be_bytes(raw)))
        }
        ValueType::Boolean => {
            let bit = bit.unwrap_or(0);
            if bit > 7 {
                return Err(DecodeError::BitOutOfRange(bit));
            }
            Ok(DecodedValue::Bool((bytes[0] >> bit) & 1 == 1))
        }
    }
}

/// Inverse of the REAL decoding, used by the setpoint write path.
pub fn encode_real(value: f32) -> [u8; 4] {
    value.to_be_bytes()
}
