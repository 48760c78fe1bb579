use proptest::prelude::*;
use tagwatch::{decode, DecodeError, DecodedValue, ValueType};

proptest! {
    #[test]
    fn test_real_decode_is_bit_exact(bits in any::<u32>()) {
        let decoded = decode(ValueType::Float32, &bits.to_be_bytes(), None).unwrap();
        let value = decoded.as_real().unwrap();
        prop_assert_eq!(value.to_bits(), bits);
    }

    #[test]
    fn test_real_matches_reference_encoder(value in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
        let decoded = decode(ValueType::Float32, &value.to_be_bytes(), None).unwrap();
        prop_assert_eq!(decoded, DecodedValue::Real(value));
    }

    #[test]
    fn test_bool_extracts_exactly_one_bit(byte in any::<u8>(), bit in 0u8..8, noise in any::<u8>()) {
        let decoded = decode(ValueType::Boolean, &[byte], Some(bit)).unwrap();
        prop_assert_eq!(decoded, DecodedValue::Bool((byte >> bit) & 1 == 1));

        // other bits do not matter
        let mask = 1u8 << bit;
        let mixed = (byte & mask) | (noise & !mask);
        prop_assert_eq!(decode(ValueType::Boolean, &[mixed], Some(bit)).unwrap(), decoded);
    }

    #[test]
    fn test_wrong_length_never_decodes(bytes in prop::collection::vec(any::<u8>(), 0..9)) {
        let result = decode(ValueType::Float32, &bytes, None);
        if bytes.len() == 4 {
            prop_assert!(result.is_ok());
        } else {
            let is_length_mismatch = matches!(result, Err(DecodeError::LengthMismatch { expected: 4, .. }));
            prop_assert!(is_length_mismatch);
        }
    }
}
