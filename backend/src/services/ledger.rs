//! Party ledger postings
//!
//! Each voucher or receipt that touches a party writes exactly one
//! `ledger_entries` row and moves `accounts.balance` by its net amount.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::Posting;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::AppResult;

/// Document a ledger entry belongs to
#[derive(Debug, Clone, Copy)]
pub enum LedgerSource {
    Voucher(Uuid),
    Receipt(Uuid),
}

/// A posting to write for one party
#[derive(Debug, Clone)]
pub struct LedgerPosting<'a> {
    pub account_id: Uuid,
    pub entry_date: NaiveDate,
    pub document_number: &'a str,
    pub narration: String,
    pub posting: Posting,
}

pub struct LedgerService;

impl LedgerService {
    /// Write a posting and move the account balance
    pub async fn post(
        conn: &mut PgConnection,
        business_id: Uuid,
        source: LedgerSource,
        entry: LedgerPosting<'_>,
    ) -> AppResult<()> {
        if entry.posting.debit.is_zero() && entry.posting.credit.is_zero() {
            return Ok(());
        }

        let (voucher_id, receipt_id) = match source {
            LedgerSource::Voucher(id) => (Some(id), None),
            LedgerSource::Receipt(id) => (None, Some(id)),
        };

        sqlx::query(
            r#"
            INSERT INTO ledger_entries
                (business_id, account_id, entry_date, voucher_id, receipt_id,
                 document_number, narration, debit, credit)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(business_id)
        .bind(entry.account_id)
        .bind(entry.entry_date)
        .bind(voucher_id)
        .bind(receipt_id)
        .bind(entry.document_number)
        .bind(&entry.narration)
        .bind(entry.posting.debit)
        .bind(entry.posting.credit)
        .execute(&mut *conn)
        .await?;

        Self::move_balance(conn, entry.account_id, entry.posting.net()).await
    }

    /// Remove every posting of a document and undo its balance effect
    pub async fn remove(conn: &mut PgConnection, source: LedgerSource) -> AppResult<()> {
        let removed = match source {
            LedgerSource::Voucher(id) => {
                sqlx::query_as::<_, (Uuid, Decimal)>(
                    "DELETE FROM ledger_entries WHERE voucher_id = $1 RETURNING account_id, debit - credit",
                )
                .bind(id)
                .fetch_all(&mut *conn)
                .await?
            }
            LedgerSource::Receipt(id) => {
                sqlx::query_as::<_, (Uuid, Decimal)>(
                    "DELETE FROM ledger_entries WHERE receipt_id = $1 RETURNING account_id, debit - credit",
                )
                .bind(id)
                .fetch_all(&mut *conn)
                .await?
            }
        };

        for (account_id, net) in removed {
            Self::move_balance(&mut *conn, account_id, -net).await?;
        }
        Ok(())
    }

    async fn move_balance(conn: &mut PgConnection, account_id: Uuid, net: Decimal) -> AppResult<()> {
        sqlx::query("UPDATE accounts SET balance = balance + $2, updated_at = NOW() WHERE id = $1")
            .bind(account_id)
            .bind(net)
            .execute(conn)
            .await?;
        Ok(())
    }
}
