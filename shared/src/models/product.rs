//! Product and batch models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StockPosition;

/// A stocked product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub business_id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub hsn_code: Option<String>,
    pub sale_price: Decimal,
    pub purchase_price: Decimal,
    pub tax_percent: Decimal,
    /// Whether stock is tracked per batch as well as per product
    pub maintain_batch: bool,
    pub reorder_level: Decimal,
    pub opening_stock: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
    pub balance_stock: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn position(&self) -> StockPosition {
        StockPosition::new(self.opening_stock, self.stock_in, self.stock_out)
    }

    /// At or below reorder level (a zero reorder level never triggers)
    pub fn needs_reorder(&self) -> bool {
        self.reorder_level > Decimal::ZERO && self.balance_stock <= self.reorder_level
    }
}

/// A batch (lot) of a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub business_id: Uuid,
    pub product_id: Uuid,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub mrp: Option<Decimal>,
    pub opening_stock: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
    pub balance_stock: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn position(&self) -> StockPosition {
        StockPosition::new(self.opening_stock, self.stock_in, self.stock_out)
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < today)
    }

    /// Expires within `days` days from `today` (already expired included)
    pub fn expires_within(&self, today: NaiveDate, days: i64) -> bool {
        self.expiry_date
            .is_some_and(|d| (d - today).num_days() <= days)
    }
}
