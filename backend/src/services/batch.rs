//! Batch (lot) service for batch-maintained products

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::Batch;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::product::ProductService;

/// Batch service
#[derive(Clone)]
pub struct BatchService {
    db: PgPool,
    products: ProductService,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBatchInput {
    pub product_id: Uuid,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub mrp: Option<Decimal>,
    #[serde(default)]
    pub opening_stock: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateBatchInput {
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub mrp: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchFilter {
    pub product_id: Option<Uuid>,
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    business_id: Uuid,
    product_id: Uuid,
    batch_number: String,
    expiry_date: Option<NaiveDate>,
    mrp: Option<Decimal>,
    opening_stock: Decimal,
    stock_in: Decimal,
    stock_out: Decimal,
    balance_stock: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            id: row.id,
            business_id: row.business_id,
            product_id: row.product_id,
            batch_number: row.batch_number,
            expiry_date: row.expiry_date,
            mrp: row.mrp,
            opening_stock: row.opening_stock,
            stock_in: row.stock_in,
            stock_out: row.stock_out,
            balance_stock: row.balance_stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const BATCH_COLUMNS: &str = r#"
    id, business_id, product_id, batch_number, expiry_date, mrp,
    opening_stock, stock_in, stock_out, balance_stock, created_at, updated_at
"#;

impl BatchService {
    /// Create a new BatchService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            products: ProductService::new(db.clone(), config),
            db,
        }
    }

    /// Create a batch, posting its opening stock
    pub async fn create(&self, business_id: Uuid, user_id: Uuid, input: CreateBatchInput) -> AppResult<Batch> {
        input.validate()?;
        shared::validate_batch_number(&input.batch_number)
            .map_err(|m| AppError::validation("batch_number", m))?;
        if let Some(mrp) = input.mrp {
            shared::validate_amount(mrp).map_err(|m| AppError::validation("mrp", m))?;
        }
        shared::validate_stock_level(input.opening_stock)
            .map_err(|m| AppError::validation("opening_stock", m))?;

        let mut tx = self.db.begin().await?;

        let maintain_batch = sqlx::query_scalar::<_, bool>(
            "SELECT maintain_batch FROM products WHERE id = $1 AND business_id = $2 FOR SHARE",
        )
        .bind(input.product_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        if !maintain_batch {
            return Err(AppError::validation(
                "product_id",
                "Batches can only be created for batch-maintained products",
            ));
        }

        let batch_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO batches (business_id, product_id, batch_number, expiry_date, mrp)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(business_id)
        .bind(input.product_id)
        .bind(&input.batch_number)
        .bind(input.expiry_date)
        .bind(input.mrp)
        .fetch_one(&mut *tx)
        .await?;

        if input.opening_stock > Decimal::ZERO {
            self.products
                .post_opening(&mut tx, business_id, user_id, input.product_id, Some(batch_id), input.opening_stock)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(%business_id, %batch_id, "Created batch {}", input.batch_number);
        self.get(business_id, batch_id).await
    }

    pub async fn list(&self, business_id: Uuid, filter: BatchFilter) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {}
            FROM batches
            WHERE business_id = $1 AND ($2::uuid IS NULL OR product_id = $2)
            ORDER BY expiry_date NULLS LAST, batch_number
            "#,
            BATCH_COLUMNS
        ))
        .bind(business_id)
        .bind(filter.product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Batch::from).collect())
    }

    pub async fn get(&self, business_id: Uuid, batch_id: Uuid) -> AppResult<Batch> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {} FROM batches WHERE id = $1 AND business_id = $2",
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        Ok(row.into())
    }

    pub async fn update(&self, business_id: Uuid, batch_id: Uuid, input: UpdateBatchInput) -> AppResult<Batch> {
        input.validate()?;
        if let Some(number) = &input.batch_number {
            shared::validate_batch_number(number).map_err(|m| AppError::validation("batch_number", m))?;
        }
        if let Some(mrp) = input.mrp {
            shared::validate_amount(mrp).map_err(|m| AppError::validation("mrp", m))?;
        }

        let row = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            UPDATE batches
            SET batch_number = COALESCE($3, batch_number),
                expiry_date = COALESCE($4, expiry_date),
                mrp = COALESCE($5, mrp),
                updated_at = NOW()
            WHERE id = $1 AND business_id = $2
            RETURNING {}
            "#,
            BATCH_COLUMNS
        ))
        .bind(batch_id)
        .bind(business_id)
        .bind(&input.batch_number)
        .bind(input.expiry_date)
        .bind(input.mrp)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        Ok(row.into())
    }

    /// Delete a batch that has never moved stock
    pub async fn delete(&self, business_id: Uuid, batch_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        // The row lock makes concurrent postings against this batch wait for us
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM batches WHERE id = $1 AND business_id = $2 FOR UPDATE")
            .bind(batch_id)
            .bind(business_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        let in_use = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM stock_ledger WHERE batch_id = $1)
                OR EXISTS(SELECT 1 FROM voucher_items WHERE batch_id = $1 OR target_batch_id = $1)
            "#,
        )
        .bind(batch_id)
        .fetch_one(&mut *tx)
        .await?;

        if in_use {
            tracing::warn!(%batch_id, "Refused delete of batch with stock movements");
            return Err(AppError::conflict("batch", "Batch has stock movements"));
        }

        sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(batch_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%business_id, %batch_id, "Deleted batch");
        Ok(())
    }

    /// Batches with stock on hand expiring within `days` (expired ones included)
    pub async fn expiring(&self, business_id: Uuid, days: i64, today: NaiveDate) -> AppResult<Vec<Batch>> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            r#"
            SELECT {}
            FROM batches
            WHERE business_id = $1 AND expiry_date IS NOT NULL AND balance_stock > 0
            ORDER BY expiry_date, batch_number
            "#,
            BATCH_COLUMNS
        ))
        .bind(business_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(Batch::from)
            .filter(|b| b.expires_within(today, days))
            .collect())
    }
}
