//! Receipts, payments and their application against vouchers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountKind, VoucherType};

/// Settlement status of a payable voucher
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Partial => "Partial",
            PaymentStatus::Paid => "Paid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(PaymentStatus::Pending),
            "Partial" => Some(PaymentStatus::Partial),
            "Paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

/// Direction of money
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptKind {
    /// Money received from a customer, applied to sales invoices
    Receipt,
    /// Money paid to a supplier, applied to purchase bills
    Payment,
}

impl ReceiptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptKind::Receipt => "receipt",
            ReceiptKind::Payment => "payment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(ReceiptKind::Receipt),
            "payment" => Some(ReceiptKind::Payment),
            _ => None,
        }
    }

    pub fn default_prefix(&self) -> &'static str {
        match self {
            ReceiptKind::Receipt => "REC",
            ReceiptKind::Payment => "PAY",
        }
    }

    /// Voucher type the money is applied against
    pub fn applies_to(&self) -> VoucherType {
        match self {
            ReceiptKind::Receipt => VoucherType::Sales,
            ReceiptKind::Payment => VoucherType::Purchase,
        }
    }

    pub fn party_kind(&self) -> AccountKind {
        match self {
            ReceiptKind::Receipt => AccountKind::Customer,
            ReceiptKind::Payment => AccountKind::Supplier,
        }
    }
}

/// Derive the settlement status from total and paid amounts
pub fn payment_status(total: Decimal, paid: Decimal) -> PaymentStatus {
    if paid <= Decimal::ZERO {
        PaymentStatus::Pending
    } else if paid >= total {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    }
}

/// An open voucher a receipt can be applied to
///
/// Callers pass these oldest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outstanding {
    pub voucher_id: Uuid,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
}

impl Outstanding {
    pub fn balance(&self) -> Decimal {
        (self.total_amount - self.paid_amount).max(Decimal::ZERO)
    }
}

/// The share of a receipt applied to one voucher
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Application {
    pub voucher_id: Uuid,
    pub amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub status: PaymentStatus,
}

/// Result of applying a receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AllocationPlan {
    pub applications: Vec<Application>,
    pub unapplied: Decimal,
}

impl AllocationPlan {
    pub fn applied(&self) -> Decimal {
        self.applications.iter().map(|a| a.amount).sum()
    }
}

/// Apply `amount` greedily to `outstanding`, in the given order
///
/// Vouchers without an open balance are skipped. Whatever is left after the
/// last voucher is reported as unapplied.
pub fn allocate(amount: Decimal, outstanding: &[Outstanding]) -> AllocationPlan {
    let mut remaining = amount.max(Decimal::ZERO);
    let mut applications = Vec::new();

    for voucher in outstanding {
        if remaining.is_zero() {
            break;
        }
        let open = voucher.balance();
        if open.is_zero() {
            continue;
        }

        let applied = remaining.min(open);
        remaining -= applied;

        let paid_amount = voucher.paid_amount + applied;
        applications.push(Application {
            voucher_id: voucher.voucher_id,
            amount: applied,
            paid_amount,
            balance_amount: voucher.total_amount - paid_amount,
            status: payment_status(voucher.total_amount, paid_amount),
        });
    }

    AllocationPlan {
        applications,
        unapplied: remaining,
    }
}

/// Undo an earlier application of `amount` to a voucher
///
/// Returns the new `(paid_amount, balance_amount, status)`.
pub fn release(total: Decimal, paid: Decimal, amount: Decimal) -> (Decimal, Decimal, PaymentStatus) {
    let paid_amount = (paid - amount).max(Decimal::ZERO);
    (paid_amount, total - paid_amount, payment_status(total, paid_amount))
}

/// Recompute balance and status after the voucher total changed
///
/// Returns `None` when the new total is below what has already been paid.
pub fn rebalance(total: Decimal, paid: Decimal) -> Option<(Decimal, PaymentStatus)> {
    if total < paid {
        return None;
    }
    Some((total - paid, payment_status(total, paid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

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

    #[test]
    fn test_payment_status() {
        assert_eq!(payment_status(dec("100"), dec("0")), PaymentStatus::Pending);
        assert_eq!(payment_status(dec("100"), dec("40")), PaymentStatus::Partial);
        assert_eq!(payment_status(dec("100"), dec("100")), PaymentStatus::Paid);
        assert_eq!(payment_status(dec("0"), dec("0")), PaymentStatus::Pending);
    }

    #[test]
    fn test_allocate_oldest_first() {
        let vouchers = [open("100", "0"), open("200", "50"), open("300", "0")];
        let plan = allocate(dec("250"), &vouchers);

        assert_eq!(plan.applications.len(), 2);
        assert_eq!(plan.applications[0].amount, dec("100"));
        assert_eq!(plan.applications[0].status, PaymentStatus::Paid);
        assert_eq!(plan.applications[1].amount, dec("150"));
        assert_eq!(plan.applications[1].paid_amount, dec("200"));
        assert_eq!(plan.applications[1].status, PaymentStatus::Paid);
        assert_eq!(plan.unapplied, Decimal::ZERO);
    }

    #[test]
    fn test_allocate_partial_last() {
        let vouchers = [open("100", "0"), open("100", "0")];
        let plan = allocate(dec("130"), &vouchers);
        assert_eq!(plan.applications[1].amount, dec("30"));
        assert_eq!(plan.applications[1].balance_amount, dec("70"));
        assert_eq!(plan.applications[1].status, PaymentStatus::Partial);
    }

    #[test]
    fn test_allocate_surplus_is_unapplied() {
        let vouchers = [open("100", "90")];
        let plan = allocate(dec("50"), &vouchers);
        assert_eq!(plan.applied(), dec("10"));
        assert_eq!(plan.unapplied, dec("40"));
    }

    #[test]
    fn test_allocate_skips_settled() {
        let vouchers = [open("100", "100"), open("100", "0")];
        let plan = allocate(dec("10"), &vouchers);
        assert_eq!(plan.applications.len(), 1);
        assert_eq!(plan.applications[0].voucher_id, vouchers[1].voucher_id);
    }

    #[test]
    fn test_release() {
        let (paid, balance, status) = release(dec("100"), dec("100"), dec("30"));
        assert_eq!(paid, dec("70"));
        assert_eq!(balance, dec("30"));
        assert_eq!(status, PaymentStatus::Partial);

        let (paid, _, status) = release(dec("100"), dec("30"), dec("30"));
        assert_eq!(paid, Decimal::ZERO);
        assert_eq!(status, PaymentStatus::Pending);
    }

    #[test]
    fn test_rebalance_rejects_total_below_paid() {
        assert_eq!(rebalance(dec("50"), dec("60")), None);
        assert_eq!(rebalance(dec("80"), dec("60")), Some((dec("20"), PaymentStatus::Partial)));
        assert_eq!(rebalance(dec("60"), dec("60")), Some((dec("0"), PaymentStatus::Paid)));
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ReceiptKind::Receipt.applies_to(), VoucherType::Sales);
        assert_eq!(ReceiptKind::Payment.applies_to(), VoucherType::Purchase);
        assert_eq!(ReceiptKind::from_str("payment"), Some(ReceiptKind::Payment));
    }
}
