//! Property-based tests for BitReader
//!
//! These tests use proptest to verify that BitReader handles all possible
//! input combinations without panicking, and that draws past EOF keep
//! returning zero instead of erroring (the sticky-EOF contract).

use proptest::prelude::*;

use av1_core::BitReader;

/// Property: BitReader should never panic on any input.
proptest! {
    #[test]
    fn prop_read_bit_never_panics(data in prop::collection::vec(any::<u8>(), 0..1000)) {
        let mut reader = BitReader::new(&data);
        for _ in 0..64 {
            reader.read_bit();
        }
        reader.get(8);
        reader.get_signed(4);
        reader.get_uniform(200);
    }
}

/// Property: reading n<=31 bits never panics and the returned value always
/// fits in n bits.
proptest! {
    #[test]
    fn prop_read_bits_fits_width(data in prop::collection::vec(any::<u8>(), 1..64), n in 0u8..31) {
        let mut reader = BitReader::new(&data);
        let value = reader.read_bits(n);
        prop_assert!(value < (1u32 << n));
    }
}

/// Property: drawing past EOF never panics and keeps returning zero bits.
proptest! {
    #[test]
    fn prop_reads_past_eof_return_zero(extra_draws in 0usize..200) {
        let mut reader = BitReader::new(&[0xFF]);
        for _ in 0..8 {
            reader.read_bit();
        }
        for _ in 0..extra_draws {
            prop_assert!(!reader.read_bit());
        }
    }
}

/// Property: reading zero bits always returns 0.
#[test]
fn prop_read_zero_bits_returns_zero() {
    let data = vec![0u8, 1, 2, 3];
    let mut reader = BitReader::new(&data);
    assert_eq!(reader.read_bits(0), 0);
}
