//! Document numbering tests
//!
//! Covers:
//! - Zero padded formatting that widens instead of wrapping
//! - Seeding the next sequence from numbers already issued
//! - Prefix isolation (INV vs PINV) and prefix validation

use proptest::prelude::*;
use shared::{
    format_number, is_valid_prefix, next_from_existing, parse_suffix, ReceiptKind, VoucherType,
    DEFAULT_NUMBER_WIDTH,
};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_default_width() {
        assert_eq!(format_number("INV", 1, DEFAULT_NUMBER_WIDTH), "INV001");
        assert_eq!(format_number("INV", 999, DEFAULT_NUMBER_WIDTH), "INV999");
        assert_eq!(format_number("INV", 1000, DEFAULT_NUMBER_WIDTH), "INV1000");
    }

    #[test]
    fn test_seed_ignores_other_prefixes() {
        let issued = ["INV001", "INV007", "PINV050", "INV-X", "REC003"];
        assert_eq!(next_from_existing("INV", issued.iter().copied()), Some(8));
        assert_eq!(next_from_existing("PINV", issued.iter().copied()), Some(51));
        assert_eq!(next_from_existing("CN", issued.iter().copied()), Some(1));
    }

    #[test]
    fn test_seed_compares_numerically() {
        // Text order would put INV999 after INV1000
        let issued = ["INV999", "INV1000", "INV0998"];
        assert_eq!(next_from_existing("INV", issued.iter().copied()), Some(1001));
    }

    #[test]
    fn test_seed_refuses_to_wrap() {
        let top = format!("REC{}", u64::MAX);
        assert_eq!(next_from_existing("REC", ["REC001", top.as_str()]), None);
        assert_eq!(next_from_existing("PAY", ["REC001", top.as_str()]), Some(1));
    }

    #[test]
    fn test_default_prefixes_are_valid() {
        for vt in VoucherType::ALL {
            assert!(is_valid_prefix(vt.default_prefix()), "{}", vt.as_str());
        }
        assert!(is_valid_prefix(ReceiptKind::Receipt.default_prefix()));
        assert!(is_valid_prefix(ReceiptKind::Payment.default_prefix()));
    }

    #[test]
    fn test_invalid_prefixes() {
        assert!(!is_valid_prefix(""));
        assert!(!is_valid_prefix("inv"));
        assert!(!is_valid_prefix("INV1"));
        assert!(!is_valid_prefix("TOOLONGPFX"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn prefix_strategy() -> impl Strategy<Value = String> {
        "[A-Z]{1,8}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A formatted number parses back under its own prefix
        #[test]
        fn prop_suffix_survives_formatting(
            prefix in prefix_strategy(),
            seq in 1u64..10_000_000,
            width in 1usize..8,
        ) {
            let number = format_number(&prefix, seq, width);
            prop_assert_eq!(parse_suffix(&prefix, &number), Some(seq));
            prop_assert!(number.len() >= prefix.len() + width);
        }

        /// The seeded next value is above every number already issued
        #[test]
        fn prop_next_exceeds_issued(
            prefix in prefix_strategy(),
            issued in prop::collection::vec(1u64..100_000, 0..20),
        ) {
            let numbers: Vec<String> = issued.iter().map(|n| format_number(&prefix, *n, 3)).collect();
            let next = next_from_existing(&prefix, numbers.iter().map(String::as_str)).unwrap();
            prop_assert_eq!(next, issued.iter().copied().max().unwrap_or(0) + 1);
            let next_number = format_number(&prefix, next, 3);
            prop_assert!(!numbers.contains(&next_number));
        }

        /// Issuing one after another never repeats or goes backwards
        #[test]
        fn prop_sequence_monotonic(prefix in prefix_strategy(), count in 1usize..50) {
            let mut issued: Vec<String> = Vec::new();
            let mut last = 0u64;
            for _ in 0..count {
                let next = next_from_existing(&prefix, issued.iter().map(String::as_str)).unwrap();
                prop_assert!(next > last);
                last = next;
                issued.push(format_number(&prefix, next, DEFAULT_NUMBER_WIDTH));
            }
            prop_assert_eq!(last, count as u64);
        }
    }
}
