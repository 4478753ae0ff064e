//! Billing and payment tests
//!
//! Covers:
//! - Line amounts (gross, discount, tax) and voucher totals
//! - Payment status derivation
//! - Applying receipts oldest voucher first, releasing them, and edits
//!   against paid vouchers
//! - Amounts limited to paise so stored paid and balance add up to the total

use std::str::FromStr;

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    allocate, compute_line, payment_status, rebalance, release, round_money, summarize,
    validate_amount, validate_percent, Outstanding, PaymentStatus, ReceiptKind, VoucherType,
};
use uuid::Uuid;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn open(total: &str, paid: &str) -> Outstanding {
    Outstanding {
        voucher_id: Uuid::new_v4(),
        total_amount: dec(total),
        paid_amount: dec(paid),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_line_with_discount_and_tax() {
        let line = compute_line(dec("3"), dec("100"), dec("10"), dec("18"));
        assert_eq!(line.gross, dec("300"));
        assert_eq!(line.discount, dec("30"));
        assert_eq!(line.taxable, dec("270"));
        assert_eq!(line.tax, dec("48.60"));
        assert_eq!(line.total, dec("318.60"));
    }

    #[test]
    fn test_line_rounds_to_paise() {
        let line = compute_line(dec("0.333"), dec("10"), Decimal::ZERO, dec("5"));
        assert_eq!(line.gross, dec("3.33"));
        assert_eq!(line.tax, dec("0.17"));
        assert_eq!(line.total, dec("3.50"));
    }

    #[test]
    fn test_voucher_totals() {
        let lines = [
            compute_line(dec("2"), dec("50"), Decimal::ZERO, dec("12")),
            compute_line(dec("1"), dec("200"), dec("5"), Decimal::ZERO),
        ];
        let totals = summarize(lines.iter());
        assert_eq!(totals.subtotal, dec("300"));
        assert_eq!(totals.discount_total, dec("10"));
        assert_eq!(totals.tax_total, dec("12"));
        assert_eq!(totals.total_amount, dec("302"));
    }

    #[test]
    fn test_payment_status() {
        assert_eq!(payment_status(dec("100"), Decimal::ZERO), PaymentStatus::Pending);
        assert_eq!(payment_status(dec("100"), dec("40")), PaymentStatus::Partial);
        assert_eq!(payment_status(dec("100"), dec("100")), PaymentStatus::Paid);
        // A zero-value invoice with nothing paid stays pending
        assert_eq!(payment_status(Decimal::ZERO, Decimal::ZERO), PaymentStatus::Pending);
    }

    #[test]
    fn test_receipt_applies_oldest_first() {
        let vouchers = [open("100", "0"), open("200", "50"), open("300", "0")];
        let plan = allocate(dec("220"), &vouchers);

        assert_eq!(plan.applications.len(), 2);
        assert_eq!(plan.applications[0].amount, dec("100"));
        assert_eq!(plan.applications[0].status, PaymentStatus::Paid);
        assert_eq!(plan.applications[1].amount, dec("120"));
        assert_eq!(plan.applications[1].paid_amount, dec("170"));
        assert_eq!(plan.applications[1].balance_amount, dec("30"));
        assert_eq!(plan.applications[1].status, PaymentStatus::Partial);
        assert!(plan.unapplied.is_zero());
    }

    #[test]
    fn test_overpayment_is_unapplied() {
        let plan = allocate(dec("500"), &[open("100", "0"), open("50", "50")]);
        assert_eq!(plan.applications.len(), 1);
        assert_eq!(plan.applied(), dec("100"));
        assert_eq!(plan.unapplied, dec("400"));
    }

    #[test]
    fn test_release_restores_status() {
        let (paid, balance, status) = release(dec("100"), dec("100"), dec("30"));
        assert_eq!(paid, dec("70"));
        assert_eq!(balance, dec("30"));
        assert_eq!(status, PaymentStatus::Partial);

        let (paid, _, status) = release(dec("100"), dec("30"), dec("30"));
        assert!(paid.is_zero());
        assert_eq!(status, PaymentStatus::Pending);
    }

    #[test]
    fn test_edit_below_paid_is_refused() {
        assert_eq!(rebalance(dec("80"), dec("100")), None);
        assert_eq!(rebalance(dec("100"), dec("100")), Some((Decimal::ZERO, PaymentStatus::Paid)));
        assert_eq!(rebalance(dec("150"), dec("100")), Some((dec("50"), PaymentStatus::Partial)));
    }

    #[test]
    fn test_sub_paise_amounts_rejected() {
        assert!(validate_amount(dec("50.005")).is_err());
        assert!(validate_amount(dec("0.001")).is_err());
        assert!(validate_amount(dec("50.01")).is_ok());
        assert!(validate_amount(dec("50.010")).is_ok());
        assert!(validate_percent(dec("18.125")).is_err());
    }

    #[test]
    fn test_accepted_receipt_keeps_voucher_consistent() {
        let invoice = open("100.00", "0");
        let plan = allocate(dec("50.01"), &[invoice]);
        let app = &plan.applications[0];
        assert_eq!(round_money(app.paid_amount), app.paid_amount);
        assert_eq!(round_money(app.balance_amount), app.balance_amount);
        assert_eq!(app.paid_amount + app.balance_amount, dec("100.00"));
    }

    #[test]
    fn test_receipt_kinds_settle_matching_vouchers() {
        assert_eq!(ReceiptKind::Receipt.applies_to(), VoucherType::Sales);
        assert_eq!(ReceiptKind::Payment.applies_to(), VoucherType::Purchase);
        assert!(VoucherType::Sales.is_payable());
        assert!(VoucherType::Purchase.is_payable());
        assert!(!VoucherType::CreditNote.is_payable());
        assert!(!VoucherType::StockTransfer.is_payable());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Money amounts 0.01 to 10000.00
    fn money_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1_000_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    fn percent_strategy() -> impl Strategy<Value = Decimal> {
        (0i64..=10_000i64).prop_map(|n| Decimal::new(n, 2))
    }

    /// An open voucher: total and a paid share not above it
    fn outstanding_strategy() -> impl Strategy<Value = Outstanding> {
        (money_strategy(), 0u32..=100).prop_map(|(total, pct)| Outstanding {
            voucher_id: Uuid::new_v4(),
            total_amount: total,
            paid_amount: round_money(total * Decimal::from(pct) / Decimal::ONE_HUNDRED),
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Total is taxable plus tax, taxable is gross minus discount
        #[test]
        fn prop_line_components_add_up(
            qty in (1i64..=100_000i64).prop_map(|n| Decimal::new(n, 3)),
            rate in money_strategy(),
            discount in percent_strategy(),
            tax in percent_strategy(),
        ) {
            let line = compute_line(qty, rate, discount, tax);
            prop_assert_eq!(line.taxable, line.gross - line.discount);
            prop_assert_eq!(line.total, line.taxable + line.tax);
            prop_assert!(line.discount <= line.gross);
            prop_assert!(line.total >= Decimal::ZERO);
            prop_assert!(line.total.scale() <= 2);
        }

        /// Applied plus unapplied is exactly the receipt amount
        #[test]
        fn prop_allocation_conserves_amount(
            amount in money_strategy(),
            vouchers in prop::collection::vec(outstanding_strategy(), 0..8),
        ) {
            let plan = allocate(amount, &vouchers);
            prop_assert_eq!(plan.applied() + plan.unapplied, amount);
            prop_assert!(plan.unapplied >= Decimal::ZERO);
        }

        /// No voucher is ever paid beyond its total
        #[test]
        fn prop_allocation_never_overpays(
            amount in money_strategy(),
            vouchers in prop::collection::vec(outstanding_strategy(), 1..8),
        ) {
            let plan = allocate(amount, &vouchers);
            for app in &plan.applications {
                let voucher = vouchers.iter().find(|v| v.voucher_id == app.voucher_id).unwrap();
                prop_assert!(app.amount > Decimal::ZERO);
                prop_assert!(app.amount <= voucher.balance());
                prop_assert!(app.paid_amount <= voucher.total_amount);
                prop_assert_eq!(app.balance_amount, voucher.total_amount - app.paid_amount);
                prop_assert_eq!(app.status, payment_status(voucher.total_amount, app.paid_amount));
            }
        }

        /// A later voucher only gets money once every earlier one is settled
        #[test]
        fn prop_allocation_is_oldest_first(
            amount in money_strategy(),
            vouchers in prop::collection::vec(outstanding_strategy(), 1..8),
        ) {
            let plan = allocate(amount, &vouchers);
            if let Some(last) = plan.applications.last() {
                let last_index = vouchers.iter().position(|v| v.voucher_id == last.voucher_id).unwrap();
                for earlier in &vouchers[..last_index] {
                    let settled = plan
                        .applications
                        .iter()
                        .find(|a| a.voucher_id == earlier.voucher_id)
                        .map(|a| a.balance_amount.is_zero())
                        .unwrap_or(earlier.balance().is_zero());
                    prop_assert!(settled);
                }
            }
        }

        /// Releasing an application puts the voucher back where it was
        #[test]
        fn prop_release_undoes_allocation(
            amount in money_strategy(),
            voucher in outstanding_strategy(),
        ) {
            let plan = allocate(amount, &[voucher]);
            for app in &plan.applications {
                let (paid, balance, status) = release(voucher.total_amount, app.paid_amount, app.amount);
                prop_assert_eq!(paid, voucher.paid_amount);
                prop_assert_eq!(balance, voucher.total_amount - voucher.paid_amount);
                prop_assert_eq!(status, payment_status(voucher.total_amount, voucher.paid_amount));
            }
        }

        /// Any amount that passes validation is stored without rounding, so
        /// paid plus balance still equals the total after persisting
        #[test]
        fn prop_validated_amounts_survive_storage(
            raw in (1i64..=10_000_000i64).prop_map(|n| Decimal::new(n, 3)),
            voucher in outstanding_strategy(),
        ) {
            if validate_amount(raw).is_err() {
                prop_assert_ne!(round_money(raw), raw);
                return Ok(());
            }
            let plan = allocate(raw, &[voucher]);
            for app in &plan.applications {
                let stored_paid = round_money(app.paid_amount);
                let stored_balance = round_money(app.balance_amount);
                prop_assert_eq!(stored_paid, app.paid_amount);
                prop_assert_eq!(stored_paid + stored_balance, voucher.total_amount);
            }
            prop_assert_eq!(round_money(plan.unapplied), plan.unapplied);
        }

        /// Edits keep the paid amount and are refused exactly when the total drops below it
        #[test]
        fn prop_rebalance_guard(total in money_strategy(), paid in money_strategy()) {
            match rebalance(total, paid) {
                None => prop_assert!(total < paid),
                Some((balance, status)) => {
                    prop_assert!(total >= paid);
                    prop_assert_eq!(balance, total - paid);
                    prop_assert_eq!(status, payment_status(total, paid));
                }
            }
        }
    }
}
