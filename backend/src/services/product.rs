//! Product catalogue service
//!
//! Stock columns are never written here directly: an opening quantity is
//! posted as an automatic opening-stock voucher so the stock ledger carries it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{Product, VoucherType};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::voucher::{CreateVoucherInput, VoucherLineInput, VoucherService};

/// Product service
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
    vouchers: VoucherService,
}

fn default_unit() -> String {
    "pcs".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    pub code: String,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[serde(default = "default_unit")]
    #[validate(length(min = 1, max = 20, message = "Unit must be 1-20 characters"))]
    pub unit: String,
    #[validate(length(max = 10, message = "HSN code is too long"))]
    pub hsn_code: Option<String>,
    #[serde(default)]
    pub sale_price: Decimal,
    #[serde(default)]
    pub purchase_price: Decimal,
    #[serde(default)]
    pub tax_percent: Decimal,
    #[serde(default)]
    pub maintain_batch: bool,
    #[serde(default)]
    pub reorder_level: Decimal,
    #[serde(default)]
    pub opening_stock: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProductInput {
    pub code: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 20, message = "Unit must be 1-20 characters"))]
    pub unit: Option<String>,
    #[validate(length(max = 10, message = "HSN code is too long"))]
    pub hsn_code: Option<String>,
    pub sale_price: Option<Decimal>,
    pub purchase_price: Option<Decimal>,
    pub tax_percent: Option<Decimal>,
    pub maintain_batch: Option<bool>,
    pub reorder_level: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub active: Option<bool>,
}

/// Outcome of a CSV import
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub failed: Vec<ImportFailure>,
}

#[derive(Debug, Serialize)]
pub struct ImportFailure {
    /// 1-based data row (the header is row 0)
    pub row: usize,
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    business_id: Uuid,
    code: String,
    name: String,
    unit: String,
    hsn_code: Option<String>,
    sale_price: Decimal,
    purchase_price: Decimal,
    tax_percent: Decimal,
    maintain_batch: bool,
    reorder_level: Decimal,
    opening_stock: Decimal,
    stock_in: Decimal,
    stock_out: Decimal,
    balance_stock: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            business_id: row.business_id,
            code: row.code,
            name: row.name,
            unit: row.unit,
            hsn_code: row.hsn_code,
            sale_price: row.sale_price,
            purchase_price: row.purchase_price,
            tax_percent: row.tax_percent,
            maintain_batch: row.maintain_batch,
            reorder_level: row.reorder_level,
            opening_stock: row.opening_stock,
            stock_in: row.stock_in,
            stock_out: row.stock_out,
            balance_stock: row.balance_stock,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str = r#"
    id, business_id, code, name, unit, hsn_code, sale_price, purchase_price, tax_percent,
    maintain_batch, reorder_level, opening_stock, stock_in, stock_out, balance_stock,
    is_active, created_at, updated_at
"#;

fn check_prices(
    sale_price: Option<Decimal>,
    purchase_price: Option<Decimal>,
    tax_percent: Option<Decimal>,
    reorder_level: Option<Decimal>,
) -> AppResult<()> {
    for (field, value) in [("sale_price", sale_price), ("purchase_price", purchase_price)] {
        if let Some(value) = value {
            shared::validate_amount(value).map_err(|m| AppError::validation(field, m))?;
        }
    }
    if let Some(level) = reorder_level {
        shared::validate_stock_level(level).map_err(|m| AppError::validation("reorder_level", m))?;
    }
    if let Some(tax) = tax_percent {
        shared::validate_percent(tax).map_err(|m| AppError::validation("tax_percent", m))?;
    }
    Ok(())
}

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            vouchers: VoucherService::new(db.clone(), config),
            db,
        }
    }

    /// Create a product, posting its opening stock
    pub async fn create(&self, business_id: Uuid, user_id: Uuid, input: CreateProductInput) -> AppResult<Product> {
        input.validate()?;
        shared::validate_product_code(&input.code).map_err(|m| AppError::validation("code", m))?;
        check_prices(
            Some(input.sale_price),
            Some(input.purchase_price),
            Some(input.tax_percent),
            Some(input.reorder_level),
        )?;
        shared::validate_stock_level(input.opening_stock)
            .map_err(|m| AppError::validation("opening_stock", m))?;
        if input.maintain_batch && input.opening_stock > Decimal::ZERO {
            return Err(AppError::validation(
                "opening_stock",
                "Opening stock of a batch-maintained product is entered per batch",
            ));
        }

        let mut tx = self.db.begin().await?;

        let product_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO products (
                business_id, code, name, unit, hsn_code, sale_price, purchase_price,
                tax_percent, maintain_batch, reorder_level
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(business_id)
        .bind(&input.code)
        .bind(input.name.trim())
        .bind(&input.unit)
        .bind(&input.hsn_code)
        .bind(input.sale_price)
        .bind(input.purchase_price)
        .bind(input.tax_percent)
        .bind(input.maintain_batch)
        .bind(input.reorder_level)
        .fetch_one(&mut *tx)
        .await?;

        if input.opening_stock > Decimal::ZERO {
            self.post_opening(&mut tx, business_id, user_id, product_id, None, input.opening_stock)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(%business_id, %product_id, "Created product {}", input.code);
        self.get(business_id, product_id).await
    }

    /// Post an opening-stock voucher for a product or batch
    pub(crate) async fn post_opening(
        &self,
        conn: &mut PgConnection,
        business_id: Uuid,
        user_id: Uuid,
        product_id: Uuid,
        batch_id: Option<Uuid>,
        quantity: Decimal,
    ) -> AppResult<()> {
        let input = CreateVoucherInput {
            voucher_type: VoucherType::Product,
            voucher_date: Utc::now().date_naive(),
            account_id: None,
            reference: None,
            notes: Some("Opening stock".to_string()),
            items: vec![VoucherLineInput {
                product_id,
                batch_id,
                target_batch_id: None,
                quantity,
                rate: None,
                discount_percent: None,
                tax_percent: None,
            }],
        };
        self.vouchers.insert(conn, business_id, Some(user_id), &input).await?;
        Ok(())
    }

    pub async fn list(&self, business_id: Uuid, filter: ProductFilter) -> AppResult<Vec<Product>> {
        let search = filter.search.map(|s| format!("%{}%", s.trim()));
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {}
            FROM products
            WHERE business_id = $1
              AND ($2::text IS NULL OR code ILIKE $2 OR name ILIKE $2)
              AND ($3::bool IS NULL OR is_active = $3)
            ORDER BY code
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(business_id)
        .bind(search)
        .bind(filter.active)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn get(&self, business_id: Uuid, product_id: Uuid) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1 AND business_id = $2",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        Ok(row.into())
    }

    /// Update catalogue fields; stock columns are untouched
    pub async fn update(
        &self,
        business_id: Uuid,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        input.validate()?;
        if let Some(code) = &input.code {
            shared::validate_product_code(code).map_err(|m| AppError::validation("code", m))?;
        }
        check_prices(input.sale_price, input.purchase_price, input.tax_percent, input.reorder_level)?;

        let mut tx = self.db.begin().await?;

        let current = sqlx::query_scalar::<_, bool>(
            "SELECT maintain_batch FROM products WHERE id = $1 AND business_id = $2 FOR UPDATE",
        )
        .bind(product_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        if let Some(requested) = input.maintain_batch.filter(|m| *m != current) {
            let movements = has_movements(&mut tx, product_id).await?;
            let batches = !requested && has_batches(&mut tx, product_id).await?;
            check_batch_switch(movements, batches)?;
        }

        sqlx::query(
            r#"
            UPDATE products
            SET code = COALESCE($3, code),
                name = COALESCE($4, name),
                unit = COALESCE($5, unit),
                hsn_code = COALESCE($6, hsn_code),
                sale_price = COALESCE($7, sale_price),
                purchase_price = COALESCE($8, purchase_price),
                tax_percent = COALESCE($9, tax_percent),
                maintain_batch = COALESCE($10, maintain_batch),
                reorder_level = COALESCE($11, reorder_level),
                is_active = COALESCE($12, is_active),
                updated_at = NOW()
            WHERE id = $1 AND business_id = $2
            "#,
        )
        .bind(product_id)
        .bind(business_id)
        .bind(&input.code)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.unit)
        .bind(&input.hsn_code)
        .bind(input.sale_price)
        .bind(input.purchase_price)
        .bind(input.tax_percent)
        .bind(input.maintain_batch)
        .bind(input.reorder_level)
        .bind(input.is_active)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if input.is_active == Some(false) {
            tracing::info!(%business_id, %product_id, "Deactivated product");
        }
        self.get(business_id, product_id).await
    }

    /// Delete a product that has never moved stock
    pub async fn delete(&self, business_id: Uuid, product_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let code = sqlx::query_scalar::<_, String>(
            "SELECT code FROM products WHERE id = $1 AND business_id = $2 FOR UPDATE",
        )
        .bind(product_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        if has_movements(&mut tx, product_id).await? {
            tracing::warn!(%product_id, "Refused delete of product with stock movements");
            return Err(AppError::conflict(
                "product",
                format!("Product {} has stock movements; deactivate it instead", code),
            ));
        }

        sqlx::query("DELETE FROM batches WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%business_id, %product_id, "Deleted product {}", code);
        Ok(())
    }

    /// Active products at or below their reorder level
    pub async fn low_stock(&self, business_id: Uuid) -> AppResult<Vec<Product>> {
        let products = self
            .list(
                business_id,
                ProductFilter {
                    search: None,
                    active: Some(true),
                },
            )
            .await?;
        Ok(products.into_iter().filter(Product::needs_reorder).collect())
    }

    /// Create products from CSV with a header row
    ///
    /// Columns: `code,name,unit,hsn_code,sale_price,purchase_price,tax_percent,
    /// maintain_batch,reorder_level,opening_stock`; only `code` and `name` are
    /// required. Each row is created in its own transaction; failing rows are
    /// reported and skipped.
    pub async fn import_csv(&self, business_id: Uuid, user_id: Uuid, data: &str) -> AppResult<ImportReport> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes());

        let mut report = ImportReport {
            created: 0,
            failed: Vec::new(),
        };

        for (index, record) in reader.deserialize::<CreateProductInput>().enumerate() {
            let row = index + 1;
            let input = match record {
                Ok(input) => input,
                Err(e) => {
                    report.failed.push(ImportFailure {
                        row,
                        code: None,
                        message: format!("Unreadable row: {}", e),
                    });
                    continue;
                }
            };

            let code = input.code.clone();
            match self.create(business_id, user_id, input).await {
                Ok(_) => report.created += 1,
                Err(e) => report.failed.push(ImportFailure {
                    row,
                    code: Some(code),
                    message: e.to_string(),
                }),
            }
        }

        tracing::info!(
            %business_id,
            created = report.created,
            failed = report.failed.len(),
            "Imported products"
        );
        Ok(report)
    }
}

/// Refuse a `maintain_batch` change that would strand stock or batches
fn check_batch_switch(has_movements: bool, has_batches: bool) -> AppResult<()> {
    if has_movements {
        return Err(AppError::conflict(
            "product",
            "Batch tracking cannot be switched on a product with stock movements",
        ));
    }
    if has_batches {
        return Err(AppError::conflict(
            "product",
            "Batch tracking cannot be switched off while the product has batches",
        ));
    }
    Ok(())
}

async fn has_batches(conn: &mut PgConnection, product_id: Uuid) -> AppResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM batches WHERE product_id = $1)")
        .bind(product_id)
        .fetch_one(conn)
        .await?;
    Ok(exists)
}

async fn has_movements(conn: &mut PgConnection, product_id: Uuid) -> AppResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(SELECT 1 FROM stock_ledger WHERE product_id = $1)
            OR EXISTS(SELECT 1 FROM voucher_items WHERE product_id = $1)
        "#,
    )
    .bind(product_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}
