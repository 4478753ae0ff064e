//! Reporting service: day book and CSV export

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::DateRange;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Reporting service
#[derive(Clone)]
pub struct ReportService {
    db: PgPool,
}

/// One document in the day book
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DayBookEntry {
    pub entry_date: NaiveDate,
    pub document_type: String,
    pub document_number: String,
    pub document_id: Uuid,
    pub party: Option<String>,
    pub amount: Decimal,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayBookTotal {
    pub document_type: String,
    pub count: usize,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct DayBook {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub entries: Vec<DayBookEntry>,
    pub totals: Vec<DayBookTotal>,
}

impl ReportService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// All vouchers and receipts dated within the range
    pub async fn day_book(&self, business_id: Uuid, range: DateRange) -> AppResult<DayBook> {
        if !range.is_valid() {
            return Err(AppError::validation("from", "Start date is after end date"));
        }

        let entries = sqlx::query_as::<_, DayBookEntry>(
            r#"
            SELECT v.voucher_date AS entry_date, v.voucher_type AS document_type,
                   v.voucher_number AS document_number, v.id AS document_id,
                   a.name AS party, v.total_amount AS amount, v.status
            FROM vouchers v
            LEFT JOIN accounts a ON a.id = v.account_id
            WHERE v.business_id = $1 AND v.voucher_date BETWEEN $2 AND $3
            UNION ALL
            SELECT r.receipt_date, r.kind, r.receipt_number, r.id,
                   a.name, r.amount, NULL
            FROM receipts r
            JOIN accounts a ON a.id = r.account_id
            WHERE r.business_id = $1 AND r.receipt_date BETWEEN $2 AND $3
            ORDER BY entry_date, document_type, document_number
            "#,
        )
        .bind(business_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        let totals = day_book_totals(&entries);
        Ok(DayBook {
            from: range.start,
            to: range.end,
            entries,
            totals,
        })
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

/// Count and amount per document type, sorted by type
fn day_book_totals(entries: &[DayBookEntry]) -> Vec<DayBookTotal> {
    let mut acc: BTreeMap<&str, (usize, Decimal)> = BTreeMap::new();
    for entry in entries {
        let slot = acc.entry(entry.document_type.as_str()).or_default();
        slot.0 += 1;
        slot.1 += entry.amount;
    }
    acc.into_iter()
        .map(|(document_type, (count, amount))| DayBookTotal {
            document_type: document_type.to_string(),
            count,
            amount,
        })
        .collect()
}
