//! Voucher types and billing arithmetic

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AccountKind;
use crate::types::round_money;

/// Kinds of stock/billing documents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    /// Sales invoice to a customer
    Sales,
    /// Purchase bill from a supplier
    Purchase,
    /// Opening stock entry
    Product,
    /// Sales return from a customer
    CreditNote,
    /// Purchase return to a supplier
    DebitNote,
    /// Movement between batches of one product
    StockTransfer,
}

/// Which side of the party ledger a voucher posts to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerSide {
    Debit,
    Credit,
}

impl VoucherType {
    pub const ALL: [VoucherType; 6] = [
        VoucherType::Sales,
        VoucherType::Purchase,
        VoucherType::Product,
        VoucherType::CreditNote,
        VoucherType::DebitNote,
        VoucherType::StockTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherType::Sales => "sales",
            VoucherType::Purchase => "purchase",
            VoucherType::Product => "product",
            VoucherType::CreditNote => "credit_note",
            VoucherType::DebitNote => "debit_note",
            VoucherType::StockTransfer => "stock_transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sales" => Some(VoucherType::Sales),
            "purchase" => Some(VoucherType::Purchase),
            "product" => Some(VoucherType::Product),
            "credit_note" => Some(VoucherType::CreditNote),
            "debit_note" => Some(VoucherType::DebitNote),
            "stock_transfer" => Some(VoucherType::StockTransfer),
            _ => None,
        }
    }

    /// Default number prefix
    pub fn default_prefix(&self) -> &'static str {
        match self {
            VoucherType::Sales => "INV",
            VoucherType::Purchase => "PINV",
            VoucherType::Product => "OPN",
            VoucherType::CreditNote => "CN",
            VoucherType::DebitNote => "DN",
            VoucherType::StockTransfer => "ST",
        }
    }

    /// Whether receipts/payments can be applied against this voucher
    pub fn is_payable(&self) -> bool {
        matches!(self, VoucherType::Sales | VoucherType::Purchase)
    }

    /// Party kind required on the voucher, if any
    pub fn party_kind(&self) -> Option<AccountKind> {
        match self {
            VoucherType::Sales | VoucherType::CreditNote => Some(AccountKind::Customer),
            VoucherType::Purchase | VoucherType::DebitNote => Some(AccountKind::Supplier),
            VoucherType::Product | VoucherType::StockTransfer => None,
        }
    }

    /// Ledger side posted on the party account
    pub fn ledger_side(&self) -> Option<LedgerSide> {
        match self {
            VoucherType::Sales | VoucherType::DebitNote => Some(LedgerSide::Debit),
            VoucherType::Purchase | VoucherType::CreditNote => Some(LedgerSide::Credit),
            VoucherType::Product | VoucherType::StockTransfer => None,
        }
    }

    /// Whether lines carry prices and the voucher carries totals
    pub fn is_priced(&self) -> bool {
        !matches!(self, VoucherType::StockTransfer)
    }
}

/// Amounts computed for one voucher line
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LineAmounts {
    pub gross: Decimal,
    pub discount: Decimal,
    pub taxable: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Totals for a whole voucher
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VoucherTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total_amount: Decimal,
}

/// Compute the amounts for a single line
///
/// `gross = quantity * rate`, the discount percentage applies to gross and
/// the tax percentage applies to the discounted (taxable) amount. Each
/// component is rounded to money scale before it is summed.
pub fn compute_line(
    quantity: Decimal,
    rate: Decimal,
    discount_percent: Decimal,
    tax_percent: Decimal,
) -> LineAmounts {
    let hundred = Decimal::ONE_HUNDRED;
    let gross = round_money(quantity * rate);
    let discount = round_money(gross * discount_percent / hundred);
    let taxable = gross - discount;
    let tax = round_money(taxable * tax_percent / hundred);

    LineAmounts {
        gross,
        discount,
        taxable,
        tax,
        total: taxable + tax,
    }
}

/// Sum line amounts into voucher totals
pub fn summarize<'a, I>(lines: I) -> VoucherTotals
where
    I: IntoIterator<Item = &'a LineAmounts>,
{
    lines
        .into_iter()
        .fold(VoucherTotals::default(), |acc, line| VoucherTotals {
            subtotal: acc.subtotal + line.gross,
            discount_total: acc.discount_total + line.discount,
            tax_total: acc.tax_total + line.tax,
            total_amount: acc.total_amount + line.total,
        })
}
