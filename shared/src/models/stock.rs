//! Stock arithmetic
//!
//! Every product (and every batch of a batch-maintained product) carries
//! `opening_stock`, `stock_in` and `stock_out`; the balance is always derived
//! as `opening_stock + stock_in - stock_out`. Vouchers never write balances
//! directly: they produce [`StockMovement`]s, and edits are expressed as the
//! net difference between the previous and the new movements.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::VoucherType;

/// Stock counters for a product or a batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StockPosition {
    pub opening_stock: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
}

impl StockPosition {
    pub fn new(opening_stock: Decimal, stock_in: Decimal, stock_out: Decimal) -> Self {
        Self {
            opening_stock,
            stock_in,
            stock_out,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.opening_stock + self.stock_in - self.stock_out
    }

    /// Apply a delta, returning the new position
    pub fn apply(&self, delta: &StockDelta) -> Self {
        Self {
            opening_stock: self.opening_stock + delta.opening,
            stock_in: self.stock_in + delta.stock_in,
            stock_out: self.stock_out + delta.stock_out,
        }
    }

    /// Sum several positions (e.g. all batches of a product)
    pub fn rollup<'a, I>(positions: I) -> Self
    where
        I: IntoIterator<Item = &'a StockPosition>,
    {
        positions.into_iter().fold(Self::default(), |acc, p| Self {
            opening_stock: acc.opening_stock + p.opening_stock,
            stock_in: acc.stock_in + p.stock_in,
            stock_out: acc.stock_out + p.stock_out,
        })
    }
}

/// A voucher line as far as stock is concerned
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockLine {
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    /// Destination batch for stock transfers
    pub target_batch_id: Option<Uuid>,
    pub quantity: Decimal,
}

/// Effect of one line on one stock row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub opening: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
}

impl StockMovement {
    fn opening(product_id: Uuid, batch_id: Option<Uuid>, quantity: Decimal) -> Self {
        Self {
            product_id,
            batch_id,
            opening: quantity,
            stock_in: Decimal::ZERO,
            stock_out: Decimal::ZERO,
        }
    }

    fn inward(product_id: Uuid, batch_id: Option<Uuid>, quantity: Decimal) -> Self {
        Self {
            product_id,
            batch_id,
            opening: Decimal::ZERO,
            stock_in: quantity,
            stock_out: Decimal::ZERO,
        }
    }

    fn outward(product_id: Uuid, batch_id: Option<Uuid>, quantity: Decimal) -> Self {
        Self {
            product_id,
            batch_id,
            opening: Decimal::ZERO,
            stock_in: Decimal::ZERO,
            stock_out: quantity,
        }
    }

    /// Net change this movement makes to the balance
    pub fn balance_change(&self) -> Decimal {
        self.opening + self.stock_in - self.stock_out
    }
}

/// Aggregated change to apply to one (product, batch) row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockDelta {
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub opening: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
}

impl StockDelta {
    pub fn is_zero(&self) -> bool {
        self.opening.is_zero() && self.stock_in.is_zero() && self.stock_out.is_zero()
    }

    pub fn balance_change(&self) -> Decimal {
        self.opening + self.stock_in - self.stock_out
    }
}

/// Stock movements produced by the lines of a voucher
pub fn movements_for(voucher_type: VoucherType, lines: &[StockLine]) -> Vec<StockMovement> {
    let mut movements = Vec::with_capacity(lines.len());
    for line in lines {
        match voucher_type {
            VoucherType::Sales | VoucherType::DebitNote => {
                movements.push(StockMovement::outward(line.product_id, line.batch_id, line.quantity));
            }
            VoucherType::Purchase | VoucherType::CreditNote => {
                movements.push(StockMovement::inward(line.product_id, line.batch_id, line.quantity));
            }
            VoucherType::Product => {
                movements.push(StockMovement::opening(line.product_id, line.batch_id, line.quantity));
            }
            VoucherType::StockTransfer => {
                movements.push(StockMovement::outward(line.product_id, line.batch_id, line.quantity));
                movements.push(StockMovement::inward(
                    line.product_id,
                    line.target_batch_id,
                    line.quantity,
                ));
            }
        }
    }
    movements
}

/// Net deltas that turn the effect of `previous` into the effect of `next`
///
/// Deltas are keyed by (product, batch) and returned sorted by that key, so
/// callers that lock rows in this order always lock in the same order. Keys
/// whose movements cancel out are dropped.
pub fn net_deltas(previous: &[StockMovement], next: &[StockMovement]) -> Vec<StockDelta> {
    let mut acc: BTreeMap<(Uuid, Option<Uuid>), (Decimal, Decimal, Decimal)> = BTreeMap::new();

    for m in previous {
        let entry = acc.entry((m.product_id, m.batch_id)).or_default();
        entry.0 -= m.opening;
        entry.1 -= m.stock_in;
        entry.2 -= m.stock_out;
    }
    for m in next {
        let entry = acc.entry((m.product_id, m.batch_id)).or_default();
        entry.0 += m.opening;
        entry.1 += m.stock_in;
        entry.2 += m.stock_out;
    }

    acc.into_iter()
        .map(|((product_id, batch_id), (opening, stock_in, stock_out))| StockDelta {
            product_id,
            batch_id,
            opening,
            stock_in,
            stock_out,
        })
        .filter(|d| !d.is_zero())
        .collect()
}

/// Deltas for the product rows, summing the batch deltas of each product
pub fn product_deltas(deltas: &[StockDelta]) -> Vec<StockDelta> {
    let mut acc: BTreeMap<Uuid, (Decimal, Decimal, Decimal)> = BTreeMap::new();
    for d in deltas {
        let entry = acc.entry(d.product_id).or_default();
        entry.0 += d.opening;
        entry.1 += d.stock_in;
        entry.2 += d.stock_out;
    }
    acc.into_iter()
        .map(|(product_id, (opening, stock_in, stock_out))| StockDelta {
            product_id,
            batch_id: None,
            opening,
            stock_in,
            stock_out,
        })
        .filter(|d| !d.is_zero())
        .collect()
}

/// A dated stock ledger movement used for period reports
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatedMovement {
    pub entry_date: NaiveDate,
    pub opening: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
}

/// Opening, inward, outward and closing stock over a date window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PeriodStock {
    pub opening: Decimal,
    pub stock_in: Decimal,
    pub stock_out: Decimal,
    pub closing: Decimal,
}

/// Compute period stock from ledger movements
///
/// Everything dated before `from` (including opening entries) folds into
/// the period opening. Opening entries dated inside the window also count
/// as opening, so the closing always equals the ledger balance at `to`.
pub fn period_stock(movements: &[DatedMovement], from: NaiveDate, to: NaiveDate) -> PeriodStock {
    let mut period = PeriodStock::default();
    for m in movements {
        if m.entry_date > to {
            continue;
        }
        if m.entry_date < from {
            period.opening += m.opening + m.stock_in - m.stock_out;
        } else {
            period.opening += m.opening;
            period.stock_in += m.stock_in;
            period.stock_out += m.stock_out;
        }
    }
    period.closing = period.opening + period.stock_in - period.stock_out;
    period
}

/// A ledger row with its running balance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunningRow<T> {
    pub row: T,
    pub balance: Decimal,
}

/// Attach a running balance to each movement, starting from `opening`
pub fn running_balance<T, F>(opening: Decimal, rows: Vec<T>, change: F) -> Vec<RunningRow<T>>
where
    F: Fn(&T) -> Decimal,
{
    let mut balance = opening;
    rows.into_iter()
        .map(|row| {
            balance += change(&row);
            RunningRow { row, balance }
        })
        .collect()
}
