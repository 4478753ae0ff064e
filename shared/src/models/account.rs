//! Party accounts (customers and suppliers) and their ledger

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LedgerSide;

/// Kind of party
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Customer,
    Supplier,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Customer => "customer",
            AccountKind::Supplier => "supplier",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(AccountKind::Customer),
            "supplier" => Some(AccountKind::Supplier),
            _ => None,
        }
    }
}

/// A customer or supplier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    /// Positive = the party owes the business
    pub opening_balance: Decimal,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Debit/credit amounts of one ledger posting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Posting {
    pub debit: Decimal,
    pub credit: Decimal,
}

impl Posting {
    pub fn on(side: LedgerSide, amount: Decimal) -> Self {
        match side {
            LedgerSide::Debit => Self {
                debit: amount,
                credit: Decimal::ZERO,
            },
            LedgerSide::Credit => Self {
                debit: Decimal::ZERO,
                credit: amount,
            },
        }
    }

    /// Change to the account balance
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// Ledger entry as shown on a statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementLine {
    pub entry_date: NaiveDate,
    pub document_number: Option<String>,
    pub narration: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Decimal,
}

/// Statement of account for a date window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountStatement {
    pub account_id: Uuid,
    pub account_name: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub opening_balance: Decimal,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub closing_balance: Decimal,
    pub lines: Vec<StatementLine>,
}
