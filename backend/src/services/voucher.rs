//! Voucher service: sales and purchase bills, notes, opening entries and transfers
//!
//! Every mutation runs in one transaction: number allocation, header and
//! lines, stock posting and the party ledger entry commit together or not
//! at all.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    compute_line, movements_for, rebalance, summarize, AccountKind, LineAmounts, PaginatedResponse,
    Pagination, PaginationMeta, PaymentStatus, Posting, StockLine, VoucherTotals,
    VoucherType,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::{Config, NumberingConfig};
use crate::error::{AppError, AppResult};
use crate::services::ledger::{LedgerPosting, LedgerService, LedgerSource};
use crate::services::numbering::NumberingService;
use crate::services::stock::StockService;

/// Voucher service
#[derive(Clone)]
pub struct VoucherService {
    db: PgPool,
    numbering: NumberingConfig,
    allow_negative_stock: bool,
}

/// One line of a voucher as submitted
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoucherLineInput {
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    /// Destination batch, stock transfers only
    pub target_batch_id: Option<Uuid>,
    pub quantity: Decimal,
    /// Defaults to the product's sale or purchase price
    pub rate: Option<Decimal>,
    pub discount_percent: Option<Decimal>,
    /// Defaults to the product's tax percent
    pub tax_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVoucherInput {
    pub voucher_type: VoucherType,
    pub voucher_date: NaiveDate,
    pub account_id: Option<Uuid>,
    #[validate(length(max = 100, message = "Reference is too long"))]
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "At least one line is required"))]
    pub items: Vec<VoucherLineInput>,
}

/// Replacement header and lines; the voucher type cannot change
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateVoucherInput {
    pub voucher_date: NaiveDate,
    pub account_id: Option<Uuid>,
    #[validate(length(max = 100, message = "Reference is too long"))]
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "At least one line is required"))]
    pub items: Vec<VoucherLineInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoucherFilter {
    #[serde(rename = "type")]
    pub voucher_type: Option<VoucherType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub account_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl VoucherFilter {
    pub fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

/// Voucher header
#[derive(Debug, Clone, Serialize)]
pub struct Voucher {
    pub id: Uuid,
    pub business_id: Uuid,
    pub voucher_type: VoucherType,
    pub voucher_number: String,
    pub voucher_date: NaiveDate,
    pub account_id: Option<Uuid>,
    pub account_name: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub status: Option<PaymentStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VoucherItem {
    pub id: Uuid,
    pub line_no: i32,
    pub product_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub batch_id: Option<Uuid>,
    pub batch_number: Option<String>,
    pub target_batch_id: Option<Uuid>,
    pub target_batch_number: Option<String>,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub discount_percent: Decimal,
    pub tax_percent: Decimal,
    pub gross_amount: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

/// Voucher with its lines
#[derive(Debug, Clone, Serialize)]
pub struct VoucherDetail {
    #[serde(flatten)]
    pub voucher: Voucher,
    pub items: Vec<VoucherItem>,
}

#[derive(Debug, FromRow)]
struct VoucherRow {
    id: Uuid,
    business_id: Uuid,
    voucher_type: String,
    voucher_number: String,
    voucher_date: NaiveDate,
    account_id: Option<Uuid>,
    account_name: Option<String>,
    reference: Option<String>,
    notes: Option<String>,
    subtotal: Decimal,
    discount_total: Decimal,
    tax_total: Decimal,
    total_amount: Decimal,
    paid_amount: Decimal,
    balance_amount: Decimal,
    status: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = AppError;

    fn try_from(row: VoucherRow) -> Result<Self, Self::Error> {
        let voucher_type = VoucherType::from_str(&row.voucher_type)
            .ok_or_else(|| AppError::Internal(format!("Unknown voucher type '{}'", row.voucher_type)))?;
        let status = match row.status.as_deref() {
            Some(s) => Some(
                PaymentStatus::from_str(s)
                    .ok_or_else(|| AppError::Internal(format!("Unknown payment status '{}'", s)))?,
            ),
            None => None,
        };
        Ok(Voucher {
            id: row.id,
            business_id: row.business_id,
            voucher_type,
            voucher_number: row.voucher_number,
            voucher_date: row.voucher_date,
            account_id: row.account_id,
            account_name: row.account_name,
            reference: row.reference,
            notes: row.notes,
            subtotal: row.subtotal,
            discount_total: row.discount_total,
            tax_total: row.tax_total,
            total_amount: row.total_amount,
            paid_amount: row.paid_amount,
            balance_amount: row.balance_amount,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProductRef {
    id: Uuid,
    code: String,
    sale_price: Decimal,
    purchase_price: Decimal,
    tax_percent: Decimal,
    maintain_batch: bool,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct BatchRef {
    id: Uuid,
    product_id: Uuid,
}

/// A validated line with its computed amounts
#[derive(Debug, Clone)]
struct PreparedLine {
    stock: StockLine,
    rate: Decimal,
    discount_percent: Decimal,
    tax_percent: Decimal,
    amounts: LineAmounts,
}

const VOUCHER_COLUMNS: &str = r#"
    v.id, v.business_id, v.voucher_type, v.voucher_number, v.voucher_date,
    v.account_id, a.name AS account_name, v.reference, v.notes,
    v.subtotal, v.discount_total, v.tax_total, v.total_amount,
    v.paid_amount, v.balance_amount, v.status, v.created_at, v.updated_at
"#;

/// Default rate for a line when none is given
fn default_rate(voucher_type: VoucherType, product: &ProductRef) -> Decimal {
    match voucher_type {
        VoucherType::Sales | VoucherType::CreditNote => product.sale_price,
        VoucherType::Purchase | VoucherType::DebitNote | VoucherType::Product => product.purchase_price,
        VoucherType::StockTransfer => Decimal::ZERO,
    }
}

/// Balance and status of a voucher after its total is set
///
/// Non-payable vouchers carry neither. A total below what has been paid is
/// refused.
fn payable_balance(
    voucher_type: VoucherType,
    total: Decimal,
    paid: Decimal,
) -> AppResult<(Decimal, Option<PaymentStatus>)> {
    if !voucher_type.is_payable() {
        return Ok((Decimal::ZERO, None));
    }
    let (balance, status) = rebalance(total, paid).ok_or_else(|| {
        AppError::conflict(
            "voucher",
            format!("New total {} is below the amount already paid {}", total, paid),
        )
    })?;
    Ok((balance, Some(status)))
}

/// Check one line against its product and batches, and price it
fn prepare_line(
    index: usize,
    voucher_type: VoucherType,
    line: &VoucherLineInput,
    products: &HashMap<Uuid, ProductRef>,
    batches: &HashMap<Uuid, BatchRef>,
    existing: &HashSet<Uuid>,
) -> AppResult<PreparedLine> {
    let field = |name: &str| format!("items[{}].{}", index, name);

    shared::validate_quantity(line.quantity).map_err(|m| AppError::validation(field("quantity"), m))?;

    let product = products
        .get(&line.product_id)
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
    // Lines already on the voucher keep an inactive product; new lines may not
    if !product.is_active && !existing.contains(&product.id) {
        return Err(AppError::validation(
            field("product_id"),
            format!("Product {} is inactive", product.code),
        ));
    }

    let batch_of = |id: Option<Uuid>, name: &str| -> AppResult<Option<Uuid>> {
        match id {
            None => Ok(None),
            Some(id) => match batches.get(&id) {
                Some(batch) if batch.product_id == product.id => Ok(Some(batch.id)),
                Some(_) => Err(AppError::validation(
                    field(name),
                    format!("Batch does not belong to product {}", product.code),
                )),
                None => Err(AppError::NotFound("Batch".to_string())),
            },
        }
    };

    let batch_id = batch_of(line.batch_id, "batch_id")?;
    let target_batch_id = batch_of(line.target_batch_id, "target_batch_id")?;

    if product.maintain_batch && batch_id.is_none() {
        return Err(AppError::validation(
            field("batch_id"),
            format!("Product {} is batch-maintained; a batch is required", product.code),
        ));
    }
    if !product.maintain_batch && (batch_id.is_some() || target_batch_id.is_some()) {
        let name = if batch_id.is_some() { "batch_id" } else { "target_batch_id" };
        return Err(AppError::validation(
            field(name),
            format!("Product {} does not maintain batches", product.code),
        ));
    }

    if voucher_type == VoucherType::StockTransfer {
        match target_batch_id {
            None => {
                return Err(AppError::validation(
                    field("target_batch_id"),
                    "A stock transfer needs a target batch",
                ))
            }
            Some(target) if Some(target) == batch_id => {
                return Err(AppError::validation(
                    field("target_batch_id"),
                    "Source and target batch must differ",
                ))
            }
            Some(_) => {}
        }
    } else if target_batch_id.is_some() {
        return Err(AppError::validation(
            field("target_batch_id"),
            "Only stock transfers take a target batch",
        ));
    }

    let (rate, discount_percent, tax_percent) = if voucher_type.is_priced() {
        (
            line.rate.unwrap_or_else(|| default_rate(voucher_type, product)),
            line.discount_percent.unwrap_or(Decimal::ZERO),
            line.tax_percent.unwrap_or(product.tax_percent),
        )
    } else {
        (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    };

    shared::validate_amount(rate).map_err(|m| AppError::validation(field("rate"), m))?;
    shared::validate_percent(discount_percent)
        .map_err(|m| AppError::validation(field("discount_percent"), m))?;
    shared::validate_percent(tax_percent).map_err(|m| AppError::validation(field("tax_percent"), m))?;

    Ok(PreparedLine {
        stock: StockLine {
            product_id: product.id,
            batch_id,
            target_batch_id,
            quantity: line.quantity,
        },
        rate,
        discount_percent,
        tax_percent,
        amounts: compute_line(line.quantity, rate, discount_percent, tax_percent),
    })
}

impl VoucherService {
    /// Create a new VoucherService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            numbering: config.numbering.clone(),
            allow_negative_stock: config.inventory.allow_negative_stock,
        }
    }

    /// Create a voucher
    pub async fn create(
        &self,
        business_id: Uuid,
        user_id: Uuid,
        input: CreateVoucherInput,
    ) -> AppResult<VoucherDetail> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let (voucher_id, number) = self.insert(&mut tx, business_id, Some(user_id), &input).await?;
        tx.commit().await?;

        tracing::info!(%business_id, %voucher_id, "Created {} voucher {}", input.voucher_type.as_str(), number);

        self.get(business_id, voucher_id).await
    }

    /// Insert a voucher inside the caller's transaction
    ///
    /// Returns the new id and number.
    pub(crate) async fn insert(
        &self,
        conn: &mut PgConnection,
        business_id: Uuid,
        user_id: Option<Uuid>,
        input: &CreateVoucherInput,
    ) -> AppResult<(Uuid, String)> {
        let voucher_type = input.voucher_type;
        self.check_party(&mut *conn, business_id, voucher_type, input.account_id)
            .await?;
        let lines = self
            .prepare(&mut *conn, business_id, voucher_type, &input.items, &HashSet::new())
            .await?;
        let totals = summarize(lines.iter().map(|l| &l.amounts));

        let prefix = self.numbering.voucher_prefix(voucher_type).to_string();
        let number = NumberingService::allocate(&mut *conn, business_id, &prefix, self.numbering.width).await?;

        let (balance_amount, status) = payable_balance(voucher_type, totals.total_amount, Decimal::ZERO)?;

        let voucher_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO vouchers (
                business_id, voucher_type, voucher_number, voucher_date, account_id,
                reference, notes, subtotal, discount_total, tax_total, total_amount,
                paid_amount, balance_amount, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(business_id)
        .bind(voucher_type.as_str())
        .bind(&number)
        .bind(input.voucher_date)
        .bind(input.account_id)
        .bind(&input.reference)
        .bind(&input.notes)
        .bind(totals.subtotal)
        .bind(totals.discount_total)
        .bind(totals.tax_total)
        .bind(totals.total_amount)
        .bind(balance_amount)
        .bind(status.map(|s| s.as_str()))
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Self::insert_items(&mut *conn, voucher_id, &lines).await?;

        let stock_lines: Vec<StockLine> = lines.iter().map(|l| l.stock).collect();
        StockService::post(
            &mut *conn,
            business_id,
            voucher_id,
            input.voucher_date,
            &[],
            &movements_for(voucher_type, &stock_lines),
            self.allow_negative_stock,
        )
        .await?;

        Self::post_ledger(
            &mut *conn,
            business_id,
            voucher_id,
            voucher_type,
            input.account_id,
            input.voucher_date,
            &number,
            &totals,
        )
        .await?;

        Ok((voucher_id, number))
    }

    /// Replace header and lines of a voucher
    pub async fn update(
        &self,
        business_id: Uuid,
        voucher_id: Uuid,
        input: UpdateVoucherInput,
    ) -> AppResult<VoucherDetail> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        let current = Self::lock(&mut tx, business_id, voucher_id).await?;
        let voucher_type = current.voucher_type;

        if current.paid_amount > Decimal::ZERO && input.account_id != current.account_id {
            return Err(AppError::conflict(
                "voucher",
                "Cannot change the party of a voucher with receipts applied",
            ));
        }

        self.check_party(&mut *tx, business_id, voucher_type, input.account_id)
            .await?;
        let previous = Self::stock_lines(&mut tx, voucher_id).await?;
        let existing: HashSet<Uuid> = previous.iter().map(|l| l.product_id).collect();
        let lines = self
            .prepare(&mut *tx, business_id, voucher_type, &input.items, &existing)
            .await?;
        let totals = summarize(lines.iter().map(|l| &l.amounts));

        let (balance_amount, status) = payable_balance(voucher_type, totals.total_amount, current.paid_amount)
            .map_err(|e| {
                tracing::warn!(%voucher_id, "Refused edit below paid amount");
                e
            })?;

        sqlx::query(
            r#"
            UPDATE vouchers
            SET voucher_date = $2, account_id = $3, reference = $4, notes = $5,
                subtotal = $6, discount_total = $7, tax_total = $8, total_amount = $9,
                balance_amount = $10, status = $11, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(voucher_id)
        .bind(input.voucher_date)
        .bind(input.account_id)
        .bind(&input.reference)
        .bind(&input.notes)
        .bind(totals.subtotal)
        .bind(totals.discount_total)
        .bind(totals.tax_total)
        .bind(totals.total_amount)
        .bind(balance_amount)
        .bind(status.map(|s| s.as_str()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM voucher_items WHERE voucher_id = $1")
            .bind(voucher_id)
            .execute(&mut *tx)
            .await?;
        Self::insert_items(&mut tx, voucher_id, &lines).await?;

        let next: Vec<StockLine> = lines.iter().map(|l| l.stock).collect();
        StockService::post(
            &mut tx,
            business_id,
            voucher_id,
            input.voucher_date,
            &movements_for(voucher_type, &previous),
            &movements_for(voucher_type, &next),
            self.allow_negative_stock,
        )
        .await?;

        LedgerService::remove(&mut tx, LedgerSource::Voucher(voucher_id)).await?;
        Self::post_ledger(
            &mut tx,
            business_id,
            voucher_id,
            voucher_type,
            input.account_id,
            input.voucher_date,
            &current.voucher_number,
            &totals,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(%business_id, %voucher_id, "Updated voucher {}", current.voucher_number);

        self.get(business_id, voucher_id).await
    }

    /// Delete a voucher and reverse its stock and ledger effects
    pub async fn delete(&self, business_id: Uuid, voucher_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let current = Self::lock(&mut tx, business_id, voucher_id).await?;

        let allocations = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM receipt_allocations WHERE voucher_id = $1",
        )
        .bind(voucher_id)
        .fetch_one(&mut *tx)
        .await?;

        if allocations > 0 {
            tracing::warn!(%voucher_id, "Refused delete of voucher with receipts applied");
            return Err(AppError::conflict(
                "voucher",
                format!(
                    "Voucher {} has receipts applied; delete those receipts first",
                    current.voucher_number
                ),
            ));
        }

        let previous = Self::stock_lines(&mut tx, voucher_id).await?;
        StockService::post(
            &mut tx,
            business_id,
            voucher_id,
            current.voucher_date,
            &movements_for(current.voucher_type, &previous),
            &[],
            self.allow_negative_stock,
        )
        .await?;

        LedgerService::remove(&mut tx, LedgerSource::Voucher(voucher_id)).await?;

        sqlx::query("DELETE FROM vouchers WHERE id = $1")
            .bind(voucher_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%business_id, %voucher_id, "Deleted voucher {}", current.voucher_number);
        Ok(())
    }

    /// Get a voucher with its lines
    pub async fn get(&self, business_id: Uuid, voucher_id: Uuid) -> AppResult<VoucherDetail> {
        let row = sqlx::query_as::<_, VoucherRow>(&format!(
            r#"
            SELECT {}
            FROM vouchers v
            LEFT JOIN accounts a ON a.id = v.account_id
            WHERE v.id = $1 AND v.business_id = $2
            "#,
            VOUCHER_COLUMNS
        ))
        .bind(voucher_id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Voucher".to_string()))?;

        let items = sqlx::query_as::<_, VoucherItem>(
            r#"
            SELECT i.id, i.line_no, i.product_id, p.code AS product_code, p.name AS product_name,
                   i.batch_id, b.batch_number, i.target_batch_id, tb.batch_number AS target_batch_number,
                   i.quantity, i.rate, i.discount_percent, i.tax_percent,
                   i.gross_amount, i.discount_amount, i.taxable_amount, i.tax_amount, i.line_total
            FROM voucher_items i
            JOIN products p ON p.id = i.product_id
            LEFT JOIN batches b ON b.id = i.batch_id
            LEFT JOIN batches tb ON tb.id = i.target_batch_id
            WHERE i.voucher_id = $1
            ORDER BY i.line_no
            "#,
        )
        .bind(voucher_id)
        .fetch_all(&self.db)
        .await?;

        Ok(VoucherDetail {
            voucher: row.try_into()?,
            items,
        })
    }

    /// List vouchers with filters
    pub async fn list(
        &self,
        business_id: Uuid,
        filter: VoucherFilter,
    ) -> AppResult<PaginatedResponse<Voucher>> {
        let pagination = filter.pagination();
        let voucher_type = filter.voucher_type.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());

        const WHERE: &str = r#"
            WHERE v.business_id = $1
              AND ($2::text IS NULL OR v.voucher_type = $2)
              AND ($3::date IS NULL OR v.voucher_date >= $3)
              AND ($4::date IS NULL OR v.voucher_date <= $4)
              AND ($5::uuid IS NULL OR v.account_id = $5)
              AND ($6::text IS NULL OR v.status = $6)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM vouchers v {}", WHERE))
            .bind(business_id)
            .bind(voucher_type)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.account_id)
            .bind(status)
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, VoucherRow>(&format!(
            r#"
            SELECT {}
            FROM vouchers v
            LEFT JOIN accounts a ON a.id = v.account_id
            {}
            ORDER BY v.voucher_date DESC, v.created_at DESC
            LIMIT $7 OFFSET $8
            "#,
            VOUCHER_COLUMNS, WHERE
        ))
        .bind(business_id)
        .bind(voucher_type)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.account_id)
        .bind(status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(Voucher::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total.max(0) as u64),
        })
    }

    /// Preview the number the next voucher of a type would receive
    pub async fn next_number(&self, business_id: Uuid, voucher_type: VoucherType) -> AppResult<String> {
        let numbering = NumberingService::new(self.db.clone(), self.numbering.width);
        numbering
            .peek(business_id, self.numbering.voucher_prefix(voucher_type))
            .await
    }

    async fn lock(conn: &mut PgConnection, business_id: Uuid, voucher_id: Uuid) -> AppResult<Voucher> {
        let row = sqlx::query_as::<_, VoucherRow>(
            r#"
            SELECT v.id, v.business_id, v.voucher_type, v.voucher_number, v.voucher_date,
                   v.account_id, NULL::text AS account_name, v.reference, v.notes,
                   v.subtotal, v.discount_total, v.tax_total, v.total_amount,
                   v.paid_amount, v.balance_amount, v.status, v.created_at, v.updated_at
            FROM vouchers v
            WHERE v.id = $1 AND v.business_id = $2
            FOR UPDATE
            "#,
        )
        .bind(voucher_id)
        .bind(business_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Voucher".to_string()))?;

        row.try_into()
    }

    async fn stock_lines(conn: &mut PgConnection, voucher_id: Uuid) -> AppResult<Vec<StockLine>> {
        let rows = sqlx::query_as::<_, (Uuid, Option<Uuid>, Option<Uuid>, Decimal)>(
            r#"
            SELECT product_id, batch_id, target_batch_id, quantity
            FROM voucher_items WHERE voucher_id = $1
            ORDER BY line_no
            "#,
        )
        .bind(voucher_id)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(product_id, batch_id, target_batch_id, quantity)| StockLine {
                product_id,
                batch_id,
                target_batch_id,
                quantity,
            })
            .collect())
    }

    async fn check_party(
        &self,
        conn: &mut PgConnection,
        business_id: Uuid,
        voucher_type: VoucherType,
        account_id: Option<Uuid>,
    ) -> AppResult<()> {
        match (voucher_type.party_kind(), account_id) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(AppError::validation(
                "account_id",
                format!("A {} voucher does not take a party", voucher_type.as_str()),
            )),
            (Some(kind), None) => Err(AppError::validation(
                "account_id",
                format!("A {} account is required", kind.as_str()),
            )),
            (Some(kind), Some(account_id)) => {
                let actual = sqlx::query_scalar::<_, String>(
                    "SELECT kind FROM accounts WHERE id = $1 AND business_id = $2",
                )
                .bind(account_id)
                .bind(business_id)
                .fetch_optional(conn)
                .await?
                .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

                if AccountKind::from_str(&actual) != Some(kind) {
                    return Err(AppError::validation(
                        "account_id",
                        format!("A {} account is required", kind.as_str()),
                    ));
                }
                Ok(())
            }
        }
    }

    async fn prepare(
        &self,
        conn: &mut PgConnection,
        business_id: Uuid,
        voucher_type: VoucherType,
        items: &[VoucherLineInput],
        existing: &HashSet<Uuid>,
    ) -> AppResult<Vec<PreparedLine>> {
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, ProductRef> = sqlx::query_as::<_, ProductRef>(
            r#"
            SELECT id, code, sale_price, purchase_price, tax_percent, maintain_batch, is_active
            FROM products
            WHERE business_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(business_id)
        .bind(&product_ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

        let batch_ids: Vec<Uuid> = items
            .iter()
            .flat_map(|i| [i.batch_id, i.target_batch_id])
            .flatten()
            .collect();
        let batches: HashMap<Uuid, BatchRef> = sqlx::query_as::<_, BatchRef>(
            "SELECT id, product_id FROM batches WHERE business_id = $1 AND id = ANY($2)",
        )
        .bind(business_id)
        .bind(&batch_ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();

        items
            .iter()
            .enumerate()
            .map(|(index, line)| prepare_line(index, voucher_type, line, &products, &batches, existing))
            .collect()
    }

    async fn insert_items(conn: &mut PgConnection, voucher_id: Uuid, lines: &[PreparedLine]) -> AppResult<()> {
        for (index, line) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO voucher_items (
                    voucher_id, line_no, product_id, batch_id, target_batch_id, quantity,
                    rate, discount_percent, tax_percent, gross_amount, discount_amount,
                    taxable_amount, tax_amount, line_total
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(voucher_id)
            .bind(index as i32 + 1)
            .bind(line.stock.product_id)
            .bind(line.stock.batch_id)
            .bind(line.stock.target_batch_id)
            .bind(line.stock.quantity)
            .bind(line.rate)
            .bind(line.discount_percent)
            .bind(line.tax_percent)
            .bind(line.amounts.gross)
            .bind(line.amounts.discount)
            .bind(line.amounts.taxable)
            .bind(line.amounts.tax)
            .bind(line.amounts.total)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn post_ledger(
        conn: &mut PgConnection,
        business_id: Uuid,
        voucher_id: Uuid,
        voucher_type: VoucherType,
        account_id: Option<Uuid>,
        entry_date: NaiveDate,
        number: &str,
        totals: &VoucherTotals,
    ) -> AppResult<()> {
        let (Some(side), Some(account_id)) = (voucher_type.ledger_side(), account_id) else {
            return Ok(());
        };
        LedgerService::post(
            conn,
            business_id,
            LedgerSource::Voucher(voucher_id),
            LedgerPosting {
                account_id,
                entry_date,
                document_number: number,
                narration: voucher_label(voucher_type).to_string(),
                posting: Posting::on(side, totals.total_amount),
            },
        )
        .await
    }
}

fn voucher_label(voucher_type: VoucherType) -> &'static str {
    match voucher_type {
        VoucherType::Sales => "Sales invoice",
        VoucherType::Purchase => "Purchase bill",
        VoucherType::Product => "Opening stock",
        VoucherType::CreditNote => "Credit note",
        VoucherType::DebitNote => "Debit note",
        VoucherType::StockTransfer => "Stock transfer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Fixture {
        products: HashMap<Uuid, ProductRef>,
        batches: HashMap<Uuid, BatchRef>,
        plain: Uuid,
        batched: Uuid,
        batch_a: Uuid,
        batch_b: Uuid,
    }

    fn fixture() -> Fixture {
        let plain = Uuid::new_v4();
        let batched = Uuid::new_v4();
        let batch_a = Uuid::new_v4();
        let batch_b = Uuid::new_v4();
        let product = |id, maintain_batch| ProductRef {
            id,
            code: "P".to_string(),
            sale_price: dec("50"),
            purchase_price: dec("40"),
            tax_percent: dec("18"),
            maintain_batch,
            is_active: true,
        };
        Fixture {
            products: [(plain, product(plain, false)), (batched, product(batched, true))].into(),
            batches: [
                (batch_a, BatchRef { id: batch_a, product_id: batched }),
                (batch_b, BatchRef { id: batch_b, product_id: batched }),
            ]
            .into(),
            plain,
            batched,
            batch_a,
            batch_b,
        }
    }

    fn line(product_id: Uuid, batch_id: Option<Uuid>, target: Option<Uuid>) -> VoucherLineInput {
        VoucherLineInput {
            product_id,
            batch_id,
            target_batch_id: target,
            quantity: dec("2"),
            rate: None,
            discount_percent: None,
            tax_percent: None,
        }
    }

    fn prepare(f: &Fixture, voucher_type: VoucherType, input: &VoucherLineInput) -> AppResult<PreparedLine> {
        prepare_line(0, voucher_type, input, &f.products, &f.batches, &HashSet::new())
    }

    fn field_of(err: AppError) -> String {
        match err {
            AppError::Validation { field, .. } => field,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_sales_line_uses_product_defaults() {
        let f = fixture();
        let prepared = prepare(&f, VoucherType::Sales, &line(f.plain, None, None)).unwrap();
        assert_eq!(prepared.rate, dec("50"));
        assert_eq!(prepared.amounts.total, dec("118.00"));

        let purchase = prepare(&f, VoucherType::Purchase, &line(f.plain, None, None)).unwrap();
        assert_eq!(purchase.rate, dec("40"));
    }

    #[test]
    fn test_batch_product_requires_batch() {
        let f = fixture();
        let err = prepare(&f, VoucherType::Sales, &line(f.batched, None, None)).unwrap_err();
        assert_eq!(field_of(err), "items[0].batch_id");

        let err = prepare_line(
            1,
            VoucherType::Sales,
            &line(f.plain, Some(f.batch_a), None),
            &f.products,
            &f.batches,
            &HashSet::new(),
        )
        .unwrap_err();
        assert_eq!(field_of(err), "items[1].batch_id");
    }

    #[test]
    fn test_transfer_rules() {
        let f = fixture();
        let ok = prepare(&f, VoucherType::StockTransfer, &line(f.batched, Some(f.batch_a), Some(f.batch_b)))
            .unwrap();
        assert_eq!(ok.amounts.total, Decimal::ZERO);
        assert_eq!(ok.stock.batch_id, Some(f.batch_a));
        assert_eq!(ok.stock.target_batch_id, Some(f.batch_b));

        let same = prepare(&f, VoucherType::StockTransfer, &line(f.batched, Some(f.batch_a), Some(f.batch_a)));
        assert_eq!(field_of(same.unwrap_err()), "items[0].target_batch_id");

        let missing = prepare(&f, VoucherType::StockTransfer, &line(f.batched, Some(f.batch_a), None));
        assert_eq!(field_of(missing.unwrap_err()), "items[0].target_batch_id");

        let no_source = prepare(&f, VoucherType::StockTransfer, &line(f.batched, None, Some(f.batch_b)));
        assert_eq!(field_of(no_source.unwrap_err()), "items[0].batch_id");

        let stray = prepare(&f, VoucherType::Sales, &line(f.batched, Some(f.batch_a), Some(f.batch_b)));
        assert_eq!(field_of(stray.unwrap_err()), "items[0].target_batch_id");
    }

    #[test]
    fn test_transfer_into_batch_of_other_product_refused() {
        let mut f = fixture();
        let other = Uuid::new_v4();
        let foreign = Uuid::new_v4();
        f.batches.insert(foreign, BatchRef { id: foreign, product_id: other });

        let err = prepare(&f, VoucherType::StockTransfer, &line(f.batched, Some(f.batch_a), Some(foreign)))
            .unwrap_err();
        assert_eq!(field_of(err), "items[0].target_batch_id");
    }

    #[test]
    fn test_untracked_product_refuses_any_batch() {
        let mut f = fixture();
        // A leftover batch of a product that no longer maintains batches
        let leftover = Uuid::new_v4();
        f.batches.insert(leftover, BatchRef { id: leftover, product_id: f.plain });

        let err = prepare(&f, VoucherType::StockTransfer, &line(f.plain, None, Some(leftover))).unwrap_err();
        assert_eq!(field_of(err), "items[0].target_batch_id");

        let err = prepare(&f, VoucherType::Purchase, &line(f.plain, Some(leftover), None)).unwrap_err();
        assert_eq!(field_of(err), "items[0].batch_id");
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let f = fixture();
        let mut input = line(f.plain, None, None);
        input.quantity = Decimal::ZERO;
        let err = prepare(&f, VoucherType::Sales, &input).unwrap_err();
        assert_eq!(field_of(err), "items[0].quantity");
    }

    #[test]
    fn test_line_scale_rejected() {
        let f = fixture();
        let mut input = line(f.plain, None, None);
        input.quantity = dec("0.0004");
        assert_eq!(field_of(prepare(&f, VoucherType::Sales, &input).unwrap_err()), "items[0].quantity");

        input.quantity = dec("0.001");
        input.rate = Some(dec("50.005"));
        assert_eq!(field_of(prepare(&f, VoucherType::Sales, &input).unwrap_err()), "items[0].rate");

        input.rate = Some(dec("50.01"));
        input.discount_percent = Some(dec("2.125"));
        assert_eq!(
            field_of(prepare(&f, VoucherType::Sales, &input).unwrap_err()),
            "items[0].discount_percent"
        );

        input.discount_percent = None;
        assert!(prepare(&f, VoucherType::Sales, &input).is_ok());
    }

    #[test]
    fn test_inactive_product_only_on_existing_lines() {
        let mut f = fixture();
        if let Some(p) = f.products.get_mut(&f.plain) {
            p.is_active = false;
        }
        let input = line(f.plain, None, None);
        let existing: HashSet<Uuid> = [f.plain].into();
        assert!(prepare(&f, VoucherType::Sales, &input).is_err());
        assert!(prepare_line(0, VoucherType::Sales, &input, &f.products, &f.batches, &existing).is_ok());

        // Another product on the voucher does not exempt a new inactive line
        let other: HashSet<Uuid> = [f.batched].into();
        let err = prepare_line(1, VoucherType::Sales, &input, &f.products, &f.batches, &other).unwrap_err();
        assert_eq!(field_of(err), "items[1].product_id");
    }

    #[test]
    fn test_payable_balance() {
        assert_eq!(
            payable_balance(VoucherType::Sales, dec("100"), Decimal::ZERO).unwrap(),
            (dec("100"), Some(PaymentStatus::Pending))
        );
        assert_eq!(
            payable_balance(VoucherType::Purchase, dec("100"), dec("40")).unwrap(),
            (dec("60"), Some(PaymentStatus::Partial))
        );
        assert_eq!(
            payable_balance(VoucherType::StockTransfer, Decimal::ZERO, Decimal::ZERO).unwrap(),
            (Decimal::ZERO, None)
        );
    }

    #[test]
    fn test_edit_below_paid_refused() {
        let err = payable_balance(VoucherType::Sales, dec("80"), dec("100")).unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));

        // Lowering to exactly the paid amount settles the voucher
        assert_eq!(
            payable_balance(VoucherType::Sales, dec("100"), dec("100")).unwrap(),
            (Decimal::ZERO, Some(PaymentStatus::Paid))
        );
    }
}
