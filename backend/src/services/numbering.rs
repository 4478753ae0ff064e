//! Document number allocation
//!
//! Counters live in `voucher_sequences`, one row per business and prefix. The
//! first allocation for a prefix seeds the counter from the highest number
//! already stored, so businesses migrated with existing documents continue
//! their series.

use shared::{format_number, next_from_existing};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Numbering service
#[derive(Clone)]
pub struct NumberingService {
    db: PgPool,
    width: usize,
}

impl NumberingService {
    pub fn new(db: PgPool, width: usize) -> Self {
        Self { db, width }
    }

    /// Reserve the next number for `prefix` inside the caller's transaction
    ///
    /// The sequence row stays locked until the transaction ends, so two
    /// concurrent inserts can never receive the same number.
    pub async fn allocate(
        conn: &mut PgConnection,
        business_id: Uuid,
        prefix: &str,
        width: usize,
    ) -> AppResult<String> {
        let bumped = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE voucher_sequences
            SET last_value = last_value + 1
            WHERE business_id = $1 AND prefix = $2
            RETURNING last_value
            "#,
        )
        .bind(business_id)
        .bind(prefix)
        .fetch_optional(&mut *conn)
        .await?;

        let value = match bumped {
            Some(value) => value,
            None => {
                let seed = Self::seed(&mut *conn, business_id, prefix).await?;
                sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO voucher_sequences (business_id, prefix, last_value)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (business_id, prefix)
                    DO UPDATE SET last_value = voucher_sequences.last_value + 1
                    RETURNING last_value
                    "#,
                )
                .bind(business_id)
                .bind(prefix)
                .bind(to_db(seed)?)
                .fetch_one(&mut *conn)
                .await?
            }
        };

        let number = format_number(prefix, from_db(value)?, width);
        tracing::debug!(%business_id, "Allocated document number {}", number);
        Ok(number)
    }

    /// Number the next document with `prefix` would receive, without reserving it
    pub async fn peek(&self, business_id: Uuid, prefix: &str) -> AppResult<String> {
        let current = sqlx::query_scalar::<_, i64>(
            "SELECT last_value FROM voucher_sequences WHERE business_id = $1 AND prefix = $2",
        )
        .bind(business_id)
        .bind(prefix)
        .fetch_optional(&self.db)
        .await?;

        let next = match current {
            Some(value) => next_value(from_db(value)?)?,
            None => {
                let mut conn = self.db.acquire().await?;
                Self::seed(&mut conn, business_id, prefix).await?
            }
        };

        Ok(format_number(prefix, next, self.width))
    }

    /// Highest existing suffix for `prefix` plus one
    async fn seed(conn: &mut PgConnection, business_id: Uuid, prefix: &str) -> AppResult<u64> {
        let pattern = format!("{}%", prefix);
        let numbers = sqlx::query_scalar::<_, String>(
            r#"
            SELECT voucher_number FROM vouchers
            WHERE business_id = $1 AND voucher_number LIKE $2
            UNION ALL
            SELECT receipt_number FROM receipts
            WHERE business_id = $1 AND receipt_number LIKE $2
            "#,
        )
        .bind(business_id)
        .bind(&pattern)
        .fetch_all(&mut *conn)
        .await?;

        next_from_existing(prefix, numbers.iter().map(String::as_str)).ok_or_else(sequence_overflow)
    }
}

fn sequence_overflow() -> AppError {
    AppError::Internal("Sequence overflow".to_string())
}

fn next_value(value: u64) -> AppResult<u64> {
    value.checked_add(1).ok_or_else(sequence_overflow)
}

fn to_db(value: u64) -> AppResult<i64> {
    i64::try_from(value).map_err(|_| sequence_overflow())
}

fn from_db(value: i64) -> AppResult<u64> {
    u64::try_from(value).map_err(|_| AppError::Internal("Negative sequence value".to_string()))
}
