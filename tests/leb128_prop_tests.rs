//! Property-based tests for LEB128 decoding
//!
//! These tests use proptest to verify that LEB128 decoding handles all
//! possible byte sequences without panicking.

use proptest::prelude::*;

use av1_core::decode_uleb128;

proptest! {
    #[test]
    fn prop_leb128_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..20)) {
        let _ = decode_uleb128(&data);
    }
}

proptest! {
    #[test]
    fn prop_leb128_roundtrips_through_encode(value in 0u64..(1u64 << 56)) {
        let encoded = av1_core::encode_uleb128(value);
        let (decoded, consumed) = decode_uleb128(&encoded).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, encoded.len());
    }
}

proptest! {
    #[test]
    fn prop_leb128_consumed_never_exceeds_input(data in prop::collection::vec(any::<u8>(), 0..20)) {
        if let Ok((_, consumed)) = decode_uleb128(&data) {
            prop_assert!(consumed <= data.len());
        }
    }
}
