//! Receipt and payment service
//!
//! A receipt (money in from a customer) or payment (money out to a supplier)
//! is applied to the party's open vouchers oldest first. The open vouchers
//! are locked for the length of the transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    allocate, release, AccountKind, LedgerSide, Outstanding, PaginatedResponse, Pagination,
    PaginationMeta, PaymentStatus, Posting, ReceiptKind,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::{Config, NumberingConfig};
use crate::error::{AppError, AppResult};
use crate::services::ledger::{LedgerPosting, LedgerService, LedgerSource};
use crate::services::numbering::NumberingService;

/// Receipt service
#[derive(Clone)]
pub struct ReceiptService {
    db: PgPool,
    numbering: NumberingConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReceiptInput {
    pub kind: ReceiptKind,
    pub receipt_date: NaiveDate,
    pub account_id: Uuid,
    pub amount: Decimal,
    /// cash, bank, upi, cheque, ...
    #[validate(length(min = 1, max = 20, message = "Mode must be 1-20 characters"))]
    pub mode: Option<String>,
    #[validate(length(max = 100, message = "Reference is too long"))]
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptFilter {
    pub kind: Option<ReceiptKind>,
    pub account_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub id: Uuid,
    pub kind: ReceiptKind,
    pub receipt_number: String,
    pub receipt_date: NaiveDate,
    pub account_id: Uuid,
    pub account_name: String,
    pub amount: Decimal,
    pub unapplied_amount: Decimal,
    pub mode: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Share of a receipt applied to a voucher
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReceiptAllocation {
    pub voucher_id: Uuid,
    pub voucher_number: String,
    pub voucher_date: NaiveDate,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptDetail {
    #[serde(flatten)]
    pub receipt: Receipt,
    pub allocations: Vec<ReceiptAllocation>,
}

/// Open payable voucher with its age
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OutstandingVoucher {
    pub voucher_id: Uuid,
    pub voucher_type: String,
    pub voucher_number: String,
    pub voucher_date: NaiveDate,
    pub account_id: Uuid,
    pub account_name: String,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub status: String,
    pub age_days: i32,
}

#[derive(Debug, FromRow)]
struct ReceiptRow {
    id: Uuid,
    kind: String,
    receipt_number: String,
    receipt_date: NaiveDate,
    account_id: Uuid,
    account_name: String,
    amount: Decimal,
    unapplied_amount: Decimal,
    mode: String,
    reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReceiptRow> for Receipt {
    type Error = AppError;

    fn try_from(row: ReceiptRow) -> Result<Self, Self::Error> {
        let kind = ReceiptKind::from_str(&row.kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown receipt kind '{}'", row.kind)))?;
        Ok(Receipt {
            id: row.id,
            kind,
            receipt_number: row.receipt_number,
            receipt_date: row.receipt_date,
            account_id: row.account_id,
            account_name: row.account_name,
            amount: row.amount,
            unapplied_amount: row.unapplied_amount,
            mode: row.mode,
            reference: row.reference,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OpenVoucher {
    id: Uuid,
    voucher_date: NaiveDate,
    voucher_number: String,
    total_amount: Decimal,
    paid_amount: Decimal,
}

const RECEIPT_COLUMNS: &str = r#"
    r.id, r.kind, r.receipt_number, r.receipt_date, r.account_id, a.name AS account_name,
    r.amount, r.unapplied_amount, r.mode, r.reference, r.notes, r.created_at, r.updated_at
"#;

fn check_amount(amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::validation("amount", "Amount must be greater than zero"));
    }
    shared::validate_amount(amount).map_err(|m| AppError::validation("amount", m))
}

/// Order locked vouchers for application: date, then number, then id
fn oldest_first(mut open: Vec<OpenVoucher>) -> Vec<Outstanding> {
    open.sort_by(|a, b| {
        (a.voucher_date, a.voucher_number.len(), &a.voucher_number, a.id).cmp(&(
            b.voucher_date,
            b.voucher_number.len(),
            &b.voucher_number,
            b.id,
        ))
    });
    open.into_iter()
        .map(|v| Outstanding {
            voucher_id: v.id,
            total_amount: v.total_amount,
            paid_amount: v.paid_amount,
        })
        .collect()
}

/// Ledger side a receipt kind posts to on the party
fn receipt_side(kind: ReceiptKind) -> LedgerSide {
    match kind {
        ReceiptKind::Receipt => LedgerSide::Credit,
        ReceiptKind::Payment => LedgerSide::Debit,
    }
}

impl ReceiptService {
    /// Create a new ReceiptService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            numbering: config.numbering.clone(),
        }
    }

    /// Record a receipt or payment and apply it to open vouchers
    pub async fn create(
        &self,
        business_id: Uuid,
        user_id: Uuid,
        input: CreateReceiptInput,
    ) -> AppResult<ReceiptDetail> {
        input.validate()?;
        check_amount(input.amount)?;

        let mut tx = self.db.begin().await?;

        let account_kind = sqlx::query_scalar::<_, String>(
            "SELECT kind FROM accounts WHERE id = $1 AND business_id = $2",
        )
        .bind(input.account_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

        let expected = input.kind.party_kind();
        if AccountKind::from_str(&account_kind) != Some(expected) {
            return Err(AppError::validation(
                "account_id",
                format!("A {} must be made against a {} account", input.kind.as_str(), expected.as_str()),
            ));
        }

        let open = sqlx::query_as::<_, OpenVoucher>(
            r#"
            SELECT id, voucher_date, voucher_number, total_amount, paid_amount
            FROM vouchers
            WHERE business_id = $1 AND account_id = $2 AND voucher_type = $3
              AND balance_amount > 0
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(business_id)
        .bind(input.account_id)
        .bind(input.kind.applies_to().as_str())
        .fetch_all(&mut *tx)
        .await?;

        // Rows are locked in id order like delete; application is oldest first
        let outstanding = oldest_first(open);
        let plan = allocate(input.amount, &outstanding);

        let prefix = self.numbering.receipt_prefix(input.kind).to_string();
        let number = NumberingService::allocate(&mut tx, business_id, &prefix, self.numbering.width).await?;

        let receipt_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO receipts (
                business_id, kind, receipt_number, receipt_date, account_id,
                amount, unapplied_amount, mode, reference, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id
            "#,
        )
        .bind(business_id)
        .bind(input.kind.as_str())
        .bind(&number)
        .bind(input.receipt_date)
        .bind(input.account_id)
        .bind(input.amount)
        .bind(plan.unapplied)
        .bind(input.mode.as_deref().unwrap_or("cash"))
        .bind(&input.reference)
        .bind(&input.notes)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        for application in &plan.applications {
            sqlx::query("INSERT INTO receipt_allocations (receipt_id, voucher_id, amount) VALUES ($1, $2, $3)")
                .bind(receipt_id)
                .bind(application.voucher_id)
                .bind(application.amount)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                UPDATE vouchers
                SET paid_amount = $2, balance_amount = $3, status = $4, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(application.voucher_id)
            .bind(application.paid_amount)
            .bind(application.balance_amount)
            .bind(application.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        LedgerService::post(
            &mut tx,
            business_id,
            LedgerSource::Receipt(receipt_id),
            LedgerPosting {
                account_id: input.account_id,
                entry_date: input.receipt_date,
                document_number: &number,
                narration: match input.kind {
                    ReceiptKind::Receipt => "Receipt".to_string(),
                    ReceiptKind::Payment => "Payment".to_string(),
                },
                posting: Posting::on(receipt_side(input.kind), input.amount),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            %business_id,
            %receipt_id,
            applied = %plan.applied(),
            unapplied = %plan.unapplied,
            "Recorded {} {}",
            input.kind.as_str(),
            number
        );

        self.get(business_id, receipt_id).await
    }

    /// Delete a receipt, releasing everything it applied
    pub async fn delete(&self, business_id: Uuid, receipt_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let number = sqlx::query_scalar::<_, String>(
            "SELECT receipt_number FROM receipts WHERE id = $1 AND business_id = $2 FOR UPDATE",
        )
        .bind(receipt_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Receipt".to_string()))?;

        let allocations = sqlx::query_as::<_, (Uuid, Decimal, Decimal, Decimal)>(
            r#"
            SELECT v.id, v.total_amount, v.paid_amount, ra.amount
            FROM receipt_allocations ra
            JOIN vouchers v ON v.id = ra.voucher_id
            WHERE ra.receipt_id = $1
            ORDER BY v.id
            FOR UPDATE OF v
            "#,
        )
        .bind(receipt_id)
        .fetch_all(&mut *tx)
        .await?;

        for (voucher_id, total, paid, amount) in allocations {
            let (paid_amount, balance_amount, status) = release(total, paid, amount);
            sqlx::query(
                r#"
                UPDATE vouchers
                SET paid_amount = $2, balance_amount = $3, status = $4, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(voucher_id)
            .bind(paid_amount)
            .bind(balance_amount)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        LedgerService::remove(&mut tx, LedgerSource::Receipt(receipt_id)).await?;

        sqlx::query("DELETE FROM receipts WHERE id = $1")
            .bind(receipt_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%business_id, %receipt_id, "Deleted receipt {}", number);
        Ok(())
    }

    /// Get a receipt with its allocations
    pub async fn get(&self, business_id: Uuid, receipt_id: Uuid) -> AppResult<ReceiptDetail> {
        let row = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            SELECT {}
            FROM receipts r
            JOIN accounts a ON a.id = r.account_id
            WHERE r.id = $1 AND r.business_id = $2
            "#,
            RECEIPT_COLUMNS
        ))
        .bind(receipt_id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Receipt".to_string()))?;

        let allocations = sqlx::query_as::<_, ReceiptAllocation>(
            r#"
            SELECT v.id AS voucher_id, v.voucher_number, v.voucher_date, ra.amount
            FROM receipt_allocations ra
            JOIN vouchers v ON v.id = ra.voucher_id
            WHERE ra.receipt_id = $1
            ORDER BY v.voucher_date, v.voucher_number
            "#,
        )
        .bind(receipt_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ReceiptDetail {
            receipt: row.try_into()?,
            allocations,
        })
    }

    /// List receipts and payments
    pub async fn list(&self, business_id: Uuid, filter: ReceiptFilter) -> AppResult<PaginatedResponse<Receipt>> {
        let defaults = Pagination::default();
        let pagination = Pagination {
            page: filter.page.unwrap_or(defaults.page),
            per_page: filter.per_page.unwrap_or(defaults.per_page),
        };
        let kind = filter.kind.map(|k| k.as_str());

        const WHERE: &str = r#"
            WHERE r.business_id = $1
              AND ($2::text IS NULL OR r.kind = $2)
              AND ($3::uuid IS NULL OR r.account_id = $3)
              AND ($4::date IS NULL OR r.receipt_date >= $4)
              AND ($5::date IS NULL OR r.receipt_date <= $5)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM receipts r {}", WHERE))
            .bind(business_id)
            .bind(kind)
            .bind(filter.account_id)
            .bind(filter.from)
            .bind(filter.to)
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            SELECT {}
            FROM receipts r
            JOIN accounts a ON a.id = r.account_id
            {}
            ORDER BY r.receipt_date DESC, r.created_at DESC
            LIMIT $6 OFFSET $7
            "#,
            RECEIPT_COLUMNS, WHERE
        ))
        .bind(business_id)
        .bind(kind)
        .bind(filter.account_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(Receipt::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total.max(0) as u64),
        })
    }

    /// Open payable vouchers dated on or before `as_of`, oldest first
    pub async fn outstanding(
        &self,
        business_id: Uuid,
        kind: ReceiptKind,
        account_id: Option<Uuid>,
        as_of: NaiveDate,
    ) -> AppResult<Vec<OutstandingVoucher>> {
        let rows = sqlx::query_as::<_, OutstandingVoucher>(
            r#"
            SELECT v.id AS voucher_id, v.voucher_type, v.voucher_number, v.voucher_date,
                   a.id AS account_id, a.name AS account_name,
                   v.total_amount, v.paid_amount, v.balance_amount,
                   COALESCE(v.status, $5) AS status,
                   ($4::date - v.voucher_date) AS age_days
            FROM vouchers v
            JOIN accounts a ON a.id = v.account_id
            WHERE v.business_id = $1 AND v.voucher_type = $2 AND v.balance_amount > 0
              AND ($3::uuid IS NULL OR v.account_id = $3)
              AND v.voucher_date <= $4
            ORDER BY v.voucher_date, length(v.voucher_number), v.voucher_number
            "#,
        )
        .bind(business_id)
        .bind(kind.applies_to().as_str())
        .bind(account_id)
        .bind(as_of)
        .bind(PaymentStatus::Pending.as_str())
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_sides() {
        // Customer receipts reduce what the customer owes; supplier payments
        // reduce what we owe the supplier
        assert_eq!(receipt_side(ReceiptKind::Receipt), LedgerSide::Credit);
        assert_eq!(receipt_side(ReceiptKind::Payment), LedgerSide::Debit);
        assert_eq!(Posting::on(receipt_side(ReceiptKind::Receipt), Decimal::TEN).net(), -Decimal::TEN);
    }

    #[test]
    fn test_amount_must_be_positive_with_two_decimals() {
        assert!(check_amount(Decimal::new(5001, 2)).is_ok());
        assert!(check_amount(Decimal::ZERO).is_err());
        let err = check_amount(Decimal::new(50005, 3)).unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "amount"));
    }

    fn open(id: u128, day: u32, number: &str, total: i64) -> OpenVoucher {
        OpenVoucher {
            id: Uuid::from_u128(id),
            voucher_date: NaiveDate::from_ymd_opt(2024, 4, day).unwrap(),
            voucher_number: number.to_string(),
            total_amount: Decimal::from(total),
            paid_amount: Decimal::ZERO,
        }
    }

    #[test]
    fn test_locked_vouchers_applied_oldest_first() {
        // Fetched in id order; INV10 sorts after INV9 on the same day
        let locked = vec![
            open(1, 5, "INV10", 100),
            open(2, 5, "INV9", 100),
            open(3, 1, "INV20", 100),
            open(4, 5, "INV9", 100),
        ];
        let ordered: Vec<Uuid> = oldest_first(locked).iter().map(|o| o.voucher_id).collect();
        assert_eq!(
            ordered,
            vec![Uuid::from_u128(3), Uuid::from_u128(2), Uuid::from_u128(4), Uuid::from_u128(1)]
        );

        let outstanding = oldest_first(vec![open(1, 9, "INV2", 100), open(2, 1, "INV1", 100)]);
        let plan = allocate(Decimal::from(150), &outstanding);
        assert_eq!(plan.applications[0].voucher_id, Uuid::from_u128(2));
        assert_eq!(plan.applications[0].amount, Decimal::from(100));
        assert_eq!(plan.applications[1].amount, Decimal::from(50));
    }
}
