//! Property-based tests for MSAC CDF adaptation
//!
//! Generalizes the fixed-data boundedness check in
//! `symbol::arithmetic::tests::test_cdf_adaptation_bounded` to randomized
//! CDF tables and randomized bitstream data: after every symbol decode, a
//! CDF's entries must stay non-decreasing and terminate at `CDF_SCALE`.

use proptest::prelude::*;

use av1_core::symbol::{ArithmeticDecoder, Cdf, CDF_SCALE};

fn cdf_from_sorted_probs(mut probs: Vec<u16>) -> Cdf {
    probs.sort_unstable();
    probs.dedup();
    if probs.is_empty() {
        probs.push(CDF_SCALE as u16 / 2);
    }
    probs.retain(|&p| p > 0 && p < CDF_SCALE as u16);
    if probs.is_empty() {
        probs.push(CDF_SCALE as u16 / 2);
    }
    Cdf::from_probs(&probs)
}

proptest! {
    #[test]
    fn prop_cdf_adapt_stays_monotonic_and_terminated(
        raw_probs in prop::collection::vec(1u16..(CDF_SCALE as u16 - 1), 1..15),
        data in prop::collection::vec(any::<u8>(), 4..64),
        draws in 1usize..20,
    ) {
        let mut cdf = cdf_from_sorted_probs(raw_probs);
        let mut decoder = match ArithmeticDecoder::new(&data) {
            Ok(d) => d,
            Err(_) => return Ok(()),
        };
        for _ in 0..draws {
            if decoder.decode_symbol(&mut cdf).is_err() {
                break;
            }
            let probs = cdf.probs();
            for w in probs.windows(2) {
                prop_assert!(w[0] <= w[1]);
            }
            prop_assert_eq!(*probs.last().unwrap(), CDF_SCALE as u16);
        }
    }
}
