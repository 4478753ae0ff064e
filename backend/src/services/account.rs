//! Customer and supplier accounts with their ledger statement

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{running_balance, Account, AccountKind, AccountStatement, DateRange, StatementLine};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Account service
#[derive(Clone)]
pub struct AccountService {
    db: PgPool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAccountInput {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub kind: AccountKind,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    /// Positive when the party owes us
    #[serde(default)]
    pub opening_balance: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateAccountInput {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub address: Option<String>,
    pub gstin: Option<String>,
    pub opening_balance: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountFilter {
    pub kind: Option<AccountKind>,
    pub search: Option<String>,
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    business_id: Uuid,
    name: String,
    kind: String,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
    gstin: Option<String>,
    opening_balance: Decimal,
    balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = AppError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let kind = AccountKind::from_str(&row.kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown account kind '{}'", row.kind)))?;
        Ok(Account {
            id: row.id,
            business_id: row.business_id,
            name: row.name,
            kind,
            phone: row.phone,
            email: row.email,
            address: row.address,
            gstin: row.gstin,
            opening_balance: row.opening_balance,
            balance: row.balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    entry_date: NaiveDate,
    document_number: Option<String>,
    narration: Option<String>,
    debit: Decimal,
    credit: Decimal,
}

const ACCOUNT_COLUMNS: &str = r#"
    id, business_id, name, kind, phone, email, address, gstin,
    opening_balance, balance, created_at, updated_at
"#;

fn check_gstin(gstin: &Option<String>) -> AppResult<()> {
    if let Some(gstin) = gstin {
        shared::validate_gstin(gstin).map_err(|m| AppError::validation("gstin", m))?;
    }
    Ok(())
}

fn check_opening_balance(opening_balance: Option<Decimal>) -> AppResult<()> {
    if let Some(amount) = opening_balance {
        shared::validate_money(amount).map_err(|m| AppError::validation("opening_balance", m))?;
    }
    Ok(())
}

impl AccountService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, business_id: Uuid, input: CreateAccountInput) -> AppResult<Account> {
        input.validate()?;
        check_gstin(&input.gstin)?;
        check_opening_balance(Some(input.opening_balance))?;

        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO accounts (business_id, name, kind, phone, email, address, gstin, opening_balance, balance)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(business_id)
        .bind(input.name.trim())
        .bind(input.kind.as_str())
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .bind(&input.gstin)
        .bind(input.opening_balance)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(%business_id, account_id = %row.id, "Created {} account", input.kind.as_str());
        row.try_into()
    }

    pub async fn list(&self, business_id: Uuid, filter: AccountFilter) -> AppResult<Vec<Account>> {
        let search = filter.search.map(|s| format!("%{}%", s.trim()));
        let rows = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            SELECT {}
            FROM accounts
            WHERE business_id = $1
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::text IS NULL OR name ILIKE $3 OR phone ILIKE $3)
            ORDER BY name
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(business_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(search)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    pub async fn get(&self, business_id: Uuid, account_id: Uuid) -> AppResult<Account> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {} FROM accounts WHERE id = $1 AND business_id = $2",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

        row.try_into()
    }

    /// Update contact details; a new opening balance shifts the running balance by the difference
    pub async fn update(
        &self,
        business_id: Uuid,
        account_id: Uuid,
        input: UpdateAccountInput,
    ) -> AppResult<Account> {
        input.validate()?;
        check_gstin(&input.gstin)?;
        check_opening_balance(input.opening_balance)?;

        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            UPDATE accounts
            SET name = COALESCE($3, name),
                phone = COALESCE($4, phone),
                email = COALESCE($5, email),
                address = COALESCE($6, address),
                gstin = COALESCE($7, gstin),
                balance = balance + COALESCE($8, opening_balance) - opening_balance,
                opening_balance = COALESCE($8, opening_balance),
                updated_at = NOW()
            WHERE id = $1 AND business_id = $2
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .bind(business_id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.address)
        .bind(&input.gstin)
        .bind(input.opening_balance)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

        row.try_into()
    }

    /// Delete an account that has never been used on a document
    pub async fn delete(&self, business_id: Uuid, account_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query_scalar::<_, Uuid>("SELECT id FROM accounts WHERE id = $1 AND business_id = $2 FOR UPDATE")
            .bind(account_id)
            .bind(business_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

        let in_use = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM vouchers WHERE account_id = $1)
                OR EXISTS(SELECT 1 FROM receipts WHERE account_id = $1)
            "#,
        )
        .bind(account_id)
        .fetch_one(&mut *tx)
        .await?;

        if in_use {
            return Err(AppError::conflict("account", "Account has vouchers or receipts"));
        }

        sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%business_id, %account_id, "Deleted account");
        Ok(())
    }

    /// Ledger statement over a window with running balance
    pub async fn statement(
        &self,
        business_id: Uuid,
        account_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<AccountStatement> {
        let account = self.get(business_id, account_id).await?;
        let range = DateRange::from_bounds(from, to);
        if !range.is_valid() {
            return Err(AppError::validation("from", "Start date is after end date"));
        }

        let before = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(debit - credit), 0) FROM ledger_entries WHERE account_id = $1 AND entry_date < $2",
        )
        .bind(account_id)
        .bind(range.start)
        .fetch_one(&self.db)
        .await?;
        let opening_balance = account.opening_balance + before;

        let entries = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT entry_date, document_number, narration, debit, credit
            FROM ledger_entries
            WHERE account_id = $1 AND entry_date BETWEEN $2 AND $3
            ORDER BY entry_date, id
            "#,
        )
        .bind(account_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(build_statement(&account, from, to, opening_balance, entries))
    }
}

fn build_statement(
    account: &Account,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    opening_balance: Decimal,
    entries: Vec<EntryRow>,
) -> AccountStatement {
    let total_debit = entries.iter().map(|e| e.debit).sum();
    let total_credit = entries.iter().map(|e| e.credit).sum();

    let lines: Vec<StatementLine> = running_balance(opening_balance, entries, |e| e.debit - e.credit)
        .into_iter()
        .map(|r| StatementLine {
            entry_date: r.row.entry_date,
            document_number: r.row.document_number,
            narration: r.row.narration,
            debit: r.row.debit,
            credit: r.row.credit,
            balance: r.balance,
        })
        .collect();

    AccountStatement {
        account_id: account.id,
        account_name: account.name.clone(),
        from,
        to,
        opening_balance,
        total_debit,
        total_credit,
        closing_balance: opening_balance + total_debit - total_credit,
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn entry(day: u32, debit: &str, credit: &str) -> EntryRow {
        EntryRow {
            entry_date: NaiveDate::from_ymd_opt(2024, 4, day).unwrap(),
            document_number: Some(format!("INV{:03}", day)),
            narration: None,
            debit: dec(debit),
            credit: dec(credit),
        }
    }

    #[test]
    fn test_opening_balance_scale() {
        assert!(check_opening_balance(Some(dec("-1200.50"))).is_ok());
        assert!(check_opening_balance(None).is_ok());
        let err = check_opening_balance(Some(dec("10.125"))).unwrap_err();
        assert!(matches!(err, AppError::Validation { field, .. } if field == "opening_balance"));
    }

    #[test]
    fn test_statement_running_balance() {
        let account = Account {
            id: Uuid::new_v4(),
            business_id: Uuid::new_v4(),
            name: "Ravi Stores".into(),
            kind: AccountKind::Customer,
            phone: None,
            email: None,
            address: None,
            gstin: None,
            opening_balance: dec("100"),
            balance: dec("100"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let statement = build_statement(
            &account,
            None,
            None,
            dec("100"),
            vec![entry(1, "500", "0"), entry(3, "0", "200"), entry(5, "50", "0")],
        );

        let balances: Vec<Decimal> = statement.lines.iter().map(|l| l.balance).collect();
        assert_eq!(balances, vec![dec("600"), dec("400"), dec("450")]);
        assert_eq!(statement.total_debit, dec("550"));
        assert_eq!(statement.total_credit, dec("200"));
        assert_eq!(statement.closing_balance, dec("450"));
    }
}
