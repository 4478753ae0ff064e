//! Stock posting, stock ledger queries and reconciliation
//!
//! Vouchers describe their stock effect as [`StockMovement`]s. Posting turns
//! the difference between the movements a voucher had and the movements it
//! now has into per-row deltas, locks the affected product and batch rows in
//! key order, checks the resulting balances and writes the new counters. The
//! `stock_ledger` rows of the voucher are rewritten to match.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    net_deltas, period_stock, product_deltas, running_balance, DateRange, DatedMovement,
    StockDelta, StockMovement, StockPosition,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Stock service
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

/// Locked counters of a product or batch row
#[derive(Debug, FromRow)]
struct StockRow {
    id: Uuid,
    label: String,
    opening_stock: Decimal,
    stock_in: Decimal,
    stock_out: Decimal,
}

impl StockRow {
    fn position(&self) -> StockPosition {
        StockPosition::new(self.opening_stock, self.stock_in, self.stock_out)
    }
}

/// One line of a product's stock ledger
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockLedgerEntry {
    pub entry_date: NaiveDate,
    pub voucher_id: Uuid,
    pub voucher_type: String,
    pub voucher_number: String,
    pub batch_id: Option<Uuid>,
    pub batch_number: Option<String>,
    pub opening: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockLedgerLine {
    #[serde(flatten)]
    pub entry: StockLedgerEntry,
    pub balance: Decimal,
}

/// Movements of one product over a window with running balance
#[derive(Debug, Serialize)]
pub struct ProductLedger {
    pub product_id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub opening: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
    pub closing: Decimal,
    pub entries: Vec<StockLedgerLine>,
}

/// Period stock of one product
#[derive(Debug, Clone, Serialize)]
pub struct ProductStockSummary {
    pub product_id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub opening: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
    pub closing: Decimal,
}

/// Period stock of one batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchStockSummary {
    pub batch_id: Uuid,
    pub product_id: Uuid,
    pub product_code: String,
    pub batch_number: String,
    pub expiry_date: Option<NaiveDate>,
    pub opening: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
    pub closing: Decimal,
}

/// A row whose stored counters disagree with its ledger
#[derive(Debug, Clone, Serialize)]
pub struct StockDrift {
    pub scope: &'static str,
    pub id: Uuid,
    pub label: String,
    pub stored: StockPosition,
    pub ledger: StockPosition,
}

#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    pub products_checked: usize,
    pub batches_checked: usize,
    pub drifted: Vec<StockDrift>,
    pub repaired: bool,
}

impl ReconcileReport {
    /// The one log line of a reconcile run
    fn log(&self, business_id: Uuid) {
        if self.drifted.is_empty() {
            tracing::info!(%business_id, "Stock reconciled, no drift");
        } else {
            tracing::warn!(
                %business_id,
                count = self.drifted.len(),
                repaired = self.repaired,
                "Stock drift found"
            );
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    key: Uuid,
    entry_date: NaiveDate,
    opening: Decimal,
    stock_in: Decimal,
    stock_out: Decimal,
}

#[derive(Debug, FromRow)]
struct LedgerTotals {
    key: Uuid,
    opening: Decimal,
    stock_in: Decimal,
    stock_out: Decimal,
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Post the stock effect of a voucher change inside the caller's transaction
    ///
    /// `previous` is what the voucher posted before (empty on create), `next`
    /// what it posts now (empty on delete).
    #[allow(clippy::too_many_arguments)]
    pub async fn post(
        conn: &mut PgConnection,
        business_id: Uuid,
        voucher_id: Uuid,
        entry_date: NaiveDate,
        previous: &[StockMovement],
        next: &[StockMovement],
        allow_negative: bool,
    ) -> AppResult<()> {
        let deltas = net_deltas(previous, next);
        let (per_product, batch_deltas) = split_deltas(&deltas);

        // Products first, then batches, each in key order
        let product_ids: Vec<Uuid> = per_product.iter().map(|d| d.product_id).collect();
        let products = Self::lock_rows(
            &mut *conn,
            r#"
            SELECT id, code AS label, opening_stock, stock_in, stock_out
            FROM products
            WHERE business_id = $1 AND id = ANY($2)
            ORDER BY id
            FOR UPDATE
            "#,
            business_id,
            &product_ids,
        )
        .await?;

        let batch_ids: Vec<Uuid> = batch_deltas.iter().filter_map(|d| d.batch_id).collect();
        let batches = Self::lock_rows(
            &mut *conn,
            r#"
            SELECT id, batch_number AS label, opening_stock, stock_in, stock_out
            FROM batches
            WHERE business_id = $1 AND id = ANY($2)
            ORDER BY id
            FOR UPDATE
            "#,
            business_id,
            &batch_ids,
        )
        .await?;

        // Every row is checked before anything is written
        let planned = plan_positions(&per_product, &batch_deltas, &products, &batches, allow_negative)?;

        for (id, position) in &planned.products {
            sqlx::query(
                r#"
                UPDATE products
                SET opening_stock = $2, stock_in = $3, stock_out = $4, balance_stock = $5, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(position.opening_stock)
            .bind(position.stock_in)
            .bind(position.stock_out)
            .bind(position.balance())
            .execute(&mut *conn)
            .await?;
        }

        for (id, position) in &planned.batches {
            sqlx::query(
                r#"
                UPDATE batches
                SET opening_stock = $2, stock_in = $3, stock_out = $4, balance_stock = $5, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(position.opening_stock)
            .bind(position.stock_in)
            .bind(position.stock_out)
            .bind(position.balance())
            .execute(&mut *conn)
            .await?;
        }

        sqlx::query("DELETE FROM stock_ledger WHERE voucher_id = $1")
            .bind(voucher_id)
            .execute(&mut *conn)
            .await?;

        for movement in next {
            sqlx::query(
                r#"
                INSERT INTO stock_ledger
                    (business_id, product_id, batch_id, voucher_id, entry_date, opening, stock_in, stock_out)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(business_id)
            .bind(movement.product_id)
            .bind(movement.batch_id)
            .bind(voucher_id)
            .bind(entry_date)
            .bind(movement.opening)
            .bind(movement.stock_in)
            .bind(movement.stock_out)
            .execute(&mut *conn)
            .await?;
        }

        tracing::debug!(%voucher_id, rows = deltas.len(), "Posted stock deltas");
        Ok(())
    }

    async fn lock_rows(
        conn: &mut PgConnection,
        sql: &str,
        business_id: Uuid,
        ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, StockRow>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, StockRow>(sql)
            .bind(business_id)
            .bind(ids)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(|r| (r.id, r)).collect())
    }

    /// Stock ledger of a product with running balance
    pub async fn product_ledger(
        &self,
        business_id: Uuid,
        product_id: Uuid,
        range: DateRange,
    ) -> AppResult<ProductLedger> {
        let (code, name, unit) = sqlx::query_as::<_, (String, String, String)>(
            "SELECT code, name, unit FROM products WHERE id = $1 AND business_id = $2",
        )
        .bind(product_id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let opening = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(opening + stock_in - stock_out), 0)
            FROM stock_ledger
            WHERE product_id = $1 AND entry_date < $2
            "#,
        )
        .bind(product_id)
        .bind(range.start)
        .fetch_one(&self.db)
        .await?;

        let entries = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            SELECT l.entry_date, l.voucher_id, v.voucher_type, v.voucher_number,
                   l.batch_id, b.batch_number, l.opening, l.stock_in, l.stock_out
            FROM stock_ledger l
            JOIN vouchers v ON v.id = l.voucher_id
            LEFT JOIN batches b ON b.id = l.batch_id
            WHERE l.product_id = $1 AND l.entry_date BETWEEN $2 AND $3
            ORDER BY l.entry_date, l.id
            "#,
        )
        .bind(product_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        let stock_in = entries.iter().map(|e| e.stock_in).sum();
        let stock_out = entries.iter().map(|e| e.stock_out).sum();
        let lines: Vec<StockLedgerLine> =
            running_balance(opening, entries, |e| e.opening + e.stock_in - e.stock_out)
                .into_iter()
                .map(|r| StockLedgerLine {
                    entry: r.row,
                    balance: r.balance,
                })
                .collect();
        let closing = lines.last().map(|l| l.balance).unwrap_or(opening);
        let opening_entries: Decimal = lines.iter().map(|l| l.entry.opening).sum();

        Ok(ProductLedger {
            product_id,
            code,
            name,
            unit,
            from: range.start,
            to: range.end,
            opening: opening + opening_entries,
            stock_in,
            stock_out,
            closing,
            entries: lines,
        })
    }

    /// Opening, in, out and closing per product over a window
    pub async fn summary(&self, business_id: Uuid, range: DateRange) -> AppResult<Vec<ProductStockSummary>> {
        let products = sqlx::query_as::<_, (Uuid, String, String, String)>(
            "SELECT id, code, name, unit FROM products WHERE business_id = $1 ORDER BY code",
        )
        .bind(business_id)
        .fetch_all(&self.db)
        .await?;

        let movements = self
            .dated_movements(
                r#"
                SELECT product_id AS key, entry_date,
                       SUM(opening) AS opening, SUM(stock_in) AS stock_in, SUM(stock_out) AS stock_out
                FROM stock_ledger
                WHERE business_id = $1 AND entry_date <= $2
                  AND ($3::uuid IS NULL OR product_id = $3)
                GROUP BY product_id, entry_date
                "#,
                business_id,
                range.end,
                None,
            )
            .await?;

        Ok(products
            .into_iter()
            .map(|(product_id, code, name, unit)| {
                let period = movements
                    .get(&product_id)
                    .map(|m| period_stock(m, range.start, range.end))
                    .unwrap_or_default();
                ProductStockSummary {
                    product_id,
                    code,
                    name,
                    unit,
                    opening: period.opening,
                    stock_in: period.stock_in,
                    stock_out: period.stock_out,
                    closing: period.closing,
                }
            })
            .collect())
    }

    /// Opening, in, out and closing per batch over a window
    pub async fn batch_summary(
        &self,
        business_id: Uuid,
        product_id: Option<Uuid>,
        range: DateRange,
    ) -> AppResult<Vec<BatchStockSummary>> {
        let batches = sqlx::query_as::<_, (Uuid, Uuid, String, String, Option<NaiveDate>)>(
            r#"
            SELECT b.id, b.product_id, p.code, b.batch_number, b.expiry_date
            FROM batches b
            JOIN products p ON p.id = b.product_id
            WHERE b.business_id = $1 AND ($2::uuid IS NULL OR b.product_id = $2)
            ORDER BY p.code, b.expiry_date NULLS LAST, b.batch_number
            "#,
        )
        .bind(business_id)
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        let movements = self
            .dated_movements(
                r#"
                SELECT batch_id AS key, entry_date,
                       SUM(opening) AS opening, SUM(stock_in) AS stock_in, SUM(stock_out) AS stock_out
                FROM stock_ledger
                WHERE business_id = $1 AND entry_date <= $2 AND batch_id IS NOT NULL
                  AND ($3::uuid IS NULL OR product_id = $3)
                GROUP BY batch_id, entry_date
                "#,
                business_id,
                range.end,
                product_id,
            )
            .await?;

        Ok(batches
            .into_iter()
            .map(|(batch_id, product_id, product_code, batch_number, expiry_date)| {
                let period = movements
                    .get(&batch_id)
                    .map(|m| period_stock(m, range.start, range.end))
                    .unwrap_or_default();
                BatchStockSummary {
                    batch_id,
                    product_id,
                    product_code,
                    batch_number,
                    expiry_date,
                    opening: period.opening,
                    stock_in: period.stock_in,
                    stock_out: period.stock_out,
                    closing: period.closing,
                }
            })
            .collect())
    }

    async fn dated_movements(
        &self,
        sql: &str,
        business_id: Uuid,
        until: NaiveDate,
        product_id: Option<Uuid>,
    ) -> AppResult<HashMap<Uuid, Vec<DatedMovement>>> {
        let rows = sqlx::query_as::<_, MovementRow>(sql)
            .bind(business_id)
            .bind(until)
            .bind(product_id)
            .fetch_all(&self.db)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<DatedMovement>> = HashMap::new();
        for row in rows {
            grouped.entry(row.key).or_default().push(DatedMovement {
                entry_date: row.entry_date,
                opening: row.opening,
                stock_in: row.stock_in,
                stock_out: row.stock_out,
            });
        }
        Ok(grouped)
    }

    /// Compare stored counters with the ledger and optionally repair them
    pub async fn reconcile(&self, business_id: Uuid, repair: bool) -> AppResult<ReconcileReport> {
        let mut tx = self.db.begin().await?;

        let products = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT id, code AS label, opening_stock, stock_in, stock_out
            FROM products WHERE business_id = $1
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(business_id)
        .fetch_all(&mut *tx)
        .await?;

        let batches = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT id, batch_number AS label, opening_stock, stock_in, stock_out
            FROM batches WHERE business_id = $1
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(business_id)
        .fetch_all(&mut *tx)
        .await?;

        let product_totals = ledger_totals(
            &mut *tx,
            r#"
            SELECT product_id AS key, SUM(opening) AS opening,
                   SUM(stock_in) AS stock_in, SUM(stock_out) AS stock_out
            FROM stock_ledger WHERE business_id = $1
            GROUP BY product_id
            "#,
            business_id,
        )
        .await?;

        let batch_totals = ledger_totals(
            &mut *tx,
            r#"
            SELECT batch_id AS key, SUM(opening) AS opening,
                   SUM(stock_in) AS stock_in, SUM(stock_out) AS stock_out
            FROM stock_ledger WHERE business_id = $1 AND batch_id IS NOT NULL
            GROUP BY batch_id
            "#,
            business_id,
        )
        .await?;

        let mut drifted = Vec::new();
        for (scope, rows, totals) in [
            ("product", &products, &product_totals),
            ("batch", &batches, &batch_totals),
        ] {
            for row in rows {
                let ledger = totals.get(&row.id).copied().unwrap_or_default();
                let stored = row.position();
                if stored != ledger {
                    drifted.push(StockDrift {
                        scope,
                        id: row.id,
                        label: row.label.clone(),
                        stored,
                        ledger,
                    });
                }
            }
        }

        if repair {
            for drift in &drifted {
                let sql = match drift.scope {
                    "product" => {
                        "UPDATE products SET opening_stock = $2, stock_in = $3, stock_out = $4, balance_stock = $5, updated_at = NOW() WHERE id = $1"
                    }
                    _ => {
                        "UPDATE batches SET opening_stock = $2, stock_in = $3, stock_out = $4, balance_stock = $5, updated_at = NOW() WHERE id = $1"
                    }
                };
                sqlx::query(sql)
                    .bind(drift.id)
                    .bind(drift.ledger.opening_stock)
                    .bind(drift.ledger.stock_in)
                    .bind(drift.ledger.stock_out)
                    .bind(drift.ledger.balance())
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
        }

        let report = ReconcileReport {
            products_checked: products.len(),
            batches_checked: batches.len(),
            drifted,
            repaired: repair,
        };
        report.log(business_id);
        Ok(report)
    }
}

async fn ledger_totals(
    conn: &mut PgConnection,
    sql: &str,
    business_id: Uuid,
) -> AppResult<HashMap<Uuid, StockPosition>> {
    let rows = sqlx::query_as::<_, LedgerTotals>(sql)
        .bind(business_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|r| (r.key, StockPosition::new(r.opening, r.stock_in, r.stock_out)))
        .collect())
}

/// Product-level deltas and the batch-level subset, both in key order
fn split_deltas(deltas: &[StockDelta]) -> (Vec<StockDelta>, Vec<StockDelta>) {
    let batch_deltas = deltas.iter().filter(|d| d.batch_id.is_some()).copied().collect();
    (product_deltas(deltas), batch_deltas)
}

/// New counters for every locked row a posting touches
#[derive(Debug, Default)]
struct PlannedPositions {
    products: Vec<(Uuid, StockPosition)>,
    batches: Vec<(Uuid, StockPosition)>,
}

fn plan_positions(
    per_product: &[StockDelta],
    batch_deltas: &[StockDelta],
    products: &HashMap<Uuid, StockRow>,
    batches: &HashMap<Uuid, StockRow>,
    allow_negative: bool,
) -> AppResult<PlannedPositions> {
    let mut planned = PlannedPositions::default();
    for delta in per_product {
        let row = products
            .get(&delta.product_id)
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        planned.products.push((row.id, checked_apply(row, delta, allow_negative)?));
    }
    for delta in batch_deltas {
        let row = delta
            .batch_id
            .and_then(|id| batches.get(&id))
            .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;
        planned.batches.push((row.id, checked_apply(row, delta, allow_negative)?));
    }
    Ok(planned)
}

/// Apply a delta to a locked row, refusing a balance that goes negative
fn checked_apply(row: &StockRow, delta: &StockDelta, allow_negative: bool) -> AppResult<StockPosition> {
    let position = row.position().apply(delta);
    if !allow_negative && delta.balance_change() < Decimal::ZERO && position.balance() < Decimal::ZERO {
        tracing::warn!(row = %row.id, "Refused stock movement below zero");
        return Err(AppError::InsufficientStock(format!(
            "{} has {} in stock, {} required",
            row.label,
            row.position().balance(),
            -delta.balance_change()
        )));
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{movements_for, StockLine, VoucherType};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn row(opening: &str, stock_in: &str, stock_out: &str) -> StockRow {
        StockRow {
            id: Uuid::new_v4(),
            label: "SOAP".to_string(),
            opening_stock: dec(opening),
            stock_in: dec(stock_in),
            stock_out: dec(stock_out),
        }
    }

    fn delta(stock_in: &str, stock_out: &str) -> StockDelta {
        StockDelta {
            product_id: Uuid::new_v4(),
            batch_id: None,
            opening: Decimal::ZERO,
            stock_in: dec(stock_in),
            stock_out: dec(stock_out),
        }
    }

    #[test]
    fn test_checked_apply_within_stock() {
        let position = checked_apply(&row("10", "5", "0"), &delta("0", "15"), false).unwrap();
        assert_eq!(position.balance(), Decimal::ZERO);
        assert_eq!(position.stock_out, dec("15"));
    }

    #[test]
    fn test_checked_apply_refuses_negative() {
        let err = checked_apply(&row("10", "0", "0"), &delta("0", "11"), false).unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(_)));
    }

    #[test]
    fn test_checked_apply_allows_negative_when_configured() {
        let position = checked_apply(&row("10", "0", "0"), &delta("0", "11"), true).unwrap();
        assert_eq!(position.balance(), dec("-1"));
    }

    fn locked(id: Uuid, label: &str, balance: &str) -> (Uuid, StockRow) {
        (
            id,
            StockRow {
                id,
                label: label.to_string(),
                opening_stock: dec(balance),
                stock_in: Decimal::ZERO,
                stock_out: Decimal::ZERO,
            },
        )
    }

    fn stock_line(product_id: Uuid, batch_id: Option<Uuid>, target: Option<Uuid>, qty: &str) -> StockLine {
        StockLine {
            product_id,
            batch_id,
            target_batch_id: target,
            quantity: dec(qty),
        }
    }

    fn plan(
        voucher_type: VoucherType,
        previous: &[StockLine],
        next: &[StockLine],
        products: &HashMap<Uuid, StockRow>,
        batches: &HashMap<Uuid, StockRow>,
        allow_negative: bool,
    ) -> AppResult<PlannedPositions> {
        let deltas = net_deltas(&movements_for(voucher_type, previous), &movements_for(voucher_type, next));
        let (per_product, batch_deltas) = split_deltas(&deltas);
        plan_positions(&per_product, &batch_deltas, products, batches, allow_negative)
    }

    #[test]
    fn test_sale_beyond_stock_refused_unless_configured() {
        let soap = Uuid::from_u128(1);
        let products: HashMap<_, _> = [locked(soap, "SOAP", "10")].into();
        let sale = [stock_line(soap, None, None, "12")];

        let err = plan(VoucherType::Sales, &[], &sale, &products, &HashMap::new(), false).unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(ref m) if m.starts_with("SOAP has 10")));

        let planned = plan(VoucherType::Sales, &[], &sale, &products, &HashMap::new(), true).unwrap();
        assert_eq!(planned.products, vec![(soap, StockPosition::new(dec("10"), Decimal::ZERO, dec("12")))]);
    }

    #[test]
    fn test_edit_checks_only_the_net_change() {
        // Raising a sale of 8 to 12 on a row holding 2 after the sale needs 4 more
        let soap = Uuid::from_u128(1);
        let products: HashMap<_, _> = [(
            soap,
            StockRow {
                id: soap,
                label: "SOAP".to_string(),
                opening_stock: dec("10"),
                stock_in: Decimal::ZERO,
                stock_out: dec("8"),
            },
        )]
        .into();
        let before = [stock_line(soap, None, None, "8")];

        let no_batches = HashMap::new();
        let after = [stock_line(soap, None, None, "10")];
        let ok = plan(VoucherType::Sales, &before, &after, &products, &no_batches, false).unwrap();
        assert_eq!(ok.products[0].1.balance(), Decimal::ZERO);

        let after = [stock_line(soap, None, None, "12")];
        let err = plan(VoucherType::Sales, &before, &after, &products, &no_batches, false).unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(_)));
    }

    #[test]
    fn test_transfer_from_short_batch_refused() {
        let product = Uuid::from_u128(1);
        let (source, target) = (Uuid::from_u128(10), Uuid::from_u128(11));
        let products: HashMap<_, _> = [locked(product, "PARA", "50")].into();
        let batches: HashMap<_, _> = [locked(source, "B-01", "3"), locked(target, "B-02", "47")].into();

        // The product total is unchanged, so only the source batch can refuse
        let transfer = [stock_line(product, Some(source), Some(target), "5")];
        let err = plan(VoucherType::StockTransfer, &[], &transfer, &products, &batches, false).unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(ref m) if m.starts_with("B-01 has 3")));

        let transfer = [stock_line(product, Some(source), Some(target), "3")];
        let planned = plan(VoucherType::StockTransfer, &[], &transfer, &products, &batches, false).unwrap();
        let balances: Vec<(Uuid, Decimal)> = planned.batches.iter().map(|(id, p)| (*id, p.balance())).collect();
        assert_eq!(balances, vec![(source, Decimal::ZERO), (target, dec("50"))]);
        assert_eq!(planned.products[0].1.balance(), dec("50"));
    }

    #[test]
    fn test_unknown_batch_is_not_found() {
        let product = Uuid::from_u128(1);
        let products: HashMap<_, _> = [locked(product, "PARA", "50")].into();
        let purchase = [stock_line(product, Some(Uuid::from_u128(99)), None, "1")];
        let err = plan(VoucherType::Purchase, &[], &purchase, &products, &HashMap::new(), false).unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref what) if what == "Batch"));
    }

    #[test]
    fn test_checked_apply_allows_improving_negative_row() {
        // Legacy rows may already be negative; inward movements must still post
        let position = checked_apply(&row("0", "0", "5"), &delta("2", "0"), false).unwrap();
        assert_eq!(position.balance(), dec("-3"));
    }

    #[test]
    fn test_reconcile_drift_logged_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::Layer;

        struct WarnCount(Arc<AtomicUsize>);

        impl<S: tracing::Subscriber> Layer<S> for WarnCount {
            fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                if *event.metadata().level() == tracing::Level::WARN {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCount(warnings.clone()));
        let report = ReconcileReport {
            products_checked: 1,
            batches_checked: 0,
            drifted: vec![StockDrift {
                scope: "product",
                id: Uuid::new_v4(),
                label: "SOAP".to_string(),
                stored: StockPosition::new(dec("10"), Decimal::ZERO, Decimal::ZERO),
                ledger: StockPosition::new(dec("12"), Decimal::ZERO, Decimal::ZERO),
            }],
            repaired: false,
        };
        tracing::subscriber::with_default(subscriber, || report.log(Uuid::new_v4()));
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }
}
