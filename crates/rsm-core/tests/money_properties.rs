//! Property tests for amount parsing and the compliance percentage.

use proptest::prelude::*;
use rsm_core::{apply_rate_bps, format_amount, parse_amount, percentage};

proptest! {
    #[test]
    fn formatted_amounts_parse_back(cents in -1_000_000_000_000i64..1_000_000_000_000i64) {
        prop_assert_eq!(parse_amount(&format_amount(cents)), Some(cents));
    }

    #[test]
    fn tax_never_exceeds_base(amount in 0i64..1_000_000_000_000i64, bps in 0i64..=10_000i64) {
        let tax = apply_rate_bps(amount, bps).unwrap();
        prop_assert!(tax >= 0);
        prop_assert!(tax <= amount);
    }

    #[test]
    fn percentage_is_bounded(whole in 1i64..1_000_000i64, frac in 0.0f64..=1.0f64) {
        let part = (whole as f64 * frac) as i64;
        let pct = percentage(part, whole);
        prop_assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn percentage_of_empty_inspection_is_zero(part in 0i64..1_000i64) {
        prop_assert_eq!(percentage(part, 0), 0.0);
    }
}
