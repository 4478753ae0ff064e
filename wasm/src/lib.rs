//! WebAssembly module for the Retail Ledger billing screen
//!
//! Lets the browser preview what the server will compute:
//! - Line amounts and invoice totals
//! - Payment status and how a receipt would be applied
//! - The next document number for a prefix
//! - Input checks (GSTIN, product code)
//!
//! Amounts cross the boundary as decimal strings so no precision is lost
//! to JavaScript floats. Structured values are JSON.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use wasm_bindgen::prelude::*;

use shared::{
    allocate, compute_line, format_number, next_from_existing, payment_status, summarize,
    validate_gstin, validate_product_code, LineAmounts, Outstanding, StockPosition, VoucherTotals,
};

/// One line as typed into the billing form
#[derive(Debug, Deserialize)]
struct LineInput {
    quantity: Decimal,
    rate: Decimal,
    #[serde(default)]
    discount_percent: Decimal,
    #[serde(default)]
    tax_percent: Decimal,
}

#[derive(Debug, Serialize)]
struct InvoicePreview {
    lines: Vec<LineAmounts>,
    totals: VoucherTotals,
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|_| format!("{} is not a number: '{}'", field, value))
}

fn preview_invoice(lines_json: &str) -> Result<String, String> {
    let inputs: Vec<LineInput> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid lines JSON: {}", e))?;
    let lines: Vec<LineAmounts> = inputs
        .iter()
        .map(|l| compute_line(l.quantity, l.rate, l.discount_percent, l.tax_percent))
        .collect();
    let totals = summarize(lines.iter());
    serde_json::to_string(&InvoicePreview { lines, totals }).map_err(|e| e.to_string())
}

fn preview_allocation(amount: &str, outstanding_json: &str) -> Result<String, String> {
    let amount = parse_decimal("amount", amount)?;
    let outstanding: Vec<Outstanding> = serde_json::from_str(outstanding_json)
        .map_err(|e| format!("Invalid outstanding JSON: {}", e))?;
    serde_json::to_string(&allocate(amount, &outstanding)).map_err(|e| e.to_string())
}

fn next_number(prefix: &str, existing_json: &str, width: usize) -> Result<String, String> {
    let existing: Vec<String> = serde_json::from_str(existing_json)
        .map_err(|e| format!("Invalid number list: {}", e))?;
    let next = next_from_existing(prefix, existing.iter().map(String::as_str))
        .ok_or_else(|| format!("No number left after the highest {} number", prefix))?;
    Ok(format_number(prefix, next, width))
}

/// Amounts of a single line as JSON (`gross`, `discount`, `taxable`, `tax`, `total`)
#[wasm_bindgen]
pub fn calculate_line(quantity: &str, rate: &str, discount_percent: &str, tax_percent: &str) -> Result<String, JsValue> {
    let amounts = (|| {
        let line = compute_line(
            parse_decimal("quantity", quantity)?,
            parse_decimal("rate", rate)?,
            parse_decimal("discount_percent", discount_percent)?,
            parse_decimal("tax_percent", tax_percent)?,
        );
        serde_json::to_string(&line).map_err(|e| e.to_string())
    })();
    amounts.map_err(|e| JsValue::from_str(&e))
}

/// Line amounts and totals for a JSON array of lines
#[wasm_bindgen]
pub fn calculate_invoice(lines_json: &str) -> Result<String, JsValue> {
    preview_invoice(lines_json).map_err(|e| JsValue::from_str(&e))
}

/// `Pending`, `Partial` or `Paid`
#[wasm_bindgen]
pub fn invoice_status(total: &str, paid: &str) -> Result<String, JsValue> {
    let status = parse_decimal("total", total)
        .and_then(|t| parse_decimal("paid", paid).map(|p| payment_status(t, p)))
        .map_err(|e| JsValue::from_str(&e))?;
    Ok(status.as_str().to_string())
}

/// How a receipt of `amount` would be applied to open vouchers, oldest first
#[wasm_bindgen]
pub fn allocate_receipt(amount: &str, outstanding_json: &str) -> Result<String, JsValue> {
    preview_allocation(amount, outstanding_json).map_err(|e| JsValue::from_str(&e))
}

/// Next number after the given list of issued numbers
#[wasm_bindgen]
pub fn next_document_number(prefix: &str, existing_json: &str, width: usize) -> Result<String, JsValue> {
    next_number(prefix, existing_json, width).map_err(|e| JsValue::from_str(&e))
}

/// Balance from opening, inward and outward quantities
#[wasm_bindgen]
pub fn stock_balance(opening: &str, stock_in: &str, stock_out: &str) -> Result<String, JsValue> {
    let position = (|| {
        Ok::<_, String>(StockPosition::new(
            parse_decimal("opening", opening)?,
            parse_decimal("stock_in", stock_in)?,
            parse_decimal("stock_out", stock_out)?,
        ))
    })()
    .map_err(|e| JsValue::from_str(&e))?;
    Ok(position.balance().to_string())
}

/// Error message for an invalid GSTIN, `None` when it is valid
#[wasm_bindgen]
pub fn check_gstin(gstin: &str) -> Option<String> {
    validate_gstin(gstin).err().map(str::to_string)
}

/// Error message for an invalid product code, `None` when it is valid
#[wasm_bindgen]
pub fn check_product_code(code: &str) -> Option<String> {
    validate_product_code(code).err().map(str::to_string)
}
