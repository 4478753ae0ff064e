//! Validation utilities for the Retail Ledger platform

use rust_decimal::Decimal;

use crate::types::{round_money, round_quantity};

// ============================================================================
// Stock and Billing Validations
// ============================================================================

/// Validate that a line quantity is strictly positive with at most 3 decimals
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    if quantity != round_quantity(quantity) {
        return Err("Quantity cannot have more than 3 decimal places");
    }
    Ok(())
}

/// Validate a stock level (opening stock, reorder level): not negative, 3 decimals
pub fn validate_stock_level(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < Decimal::ZERO {
        return Err("Stock level cannot be negative");
    }
    if quantity != round_quantity(quantity) {
        return Err("Quantity cannot have more than 3 decimal places");
    }
    Ok(())
}

/// Validate that a price or amount is not negative with at most 2 decimals
pub fn validate_amount(amount: Decimal) -> Result<(), &'static str> {
    if amount < Decimal::ZERO {
        return Err("Amount cannot be negative");
    }
    validate_money(amount)
}

/// Validate a signed money value (opening balances) has at most 2 decimals
pub fn validate_money(amount: Decimal) -> Result<(), &'static str> {
    if amount != round_money(amount) {
        return Err("Amount cannot have more than 2 decimal places");
    }
    Ok(())
}

/// Validate a percentage (discount, tax) is within 0-100 with at most 2 decimals
pub fn validate_percent(percent: Decimal) -> Result<(), &'static str> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err("Percentage must be between 0 and 100");
    }
    if percent != round_money(percent) {
        return Err("Percentage cannot have more than 2 decimal places");
    }
    Ok(())
}

/// Validate a product code (1-32 chars, alphanumeric plus `-`, `_`, `/`)
pub fn validate_product_code(code: &str) -> Result<(), &'static str> {
    if code.is_empty() || code.len() > 32 {
        return Err("Product code must be 1-32 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'))
    {
        return Err("Product code may only contain letters, digits, '-', '_' and '/'");
    }
    Ok(())
}

/// Validate a batch number (1-32 printable chars, no whitespace)
pub fn validate_batch_number(batch_number: &str) -> Result<(), &'static str> {
    if batch_number.is_empty() || batch_number.len() > 32 {
        return Err("Batch number must be 1-32 characters");
    }
    if batch_number.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err("Batch number cannot contain whitespace");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && email.len() >= 5 => Ok(()),
        _ => Err("Invalid email format"),
    }
}

/// Validate business code format (3-10 uppercase alphanumeric)
pub fn validate_business_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 3 {
        return Err("Business code must be at least 3 characters");
    }
    if code.len() > 10 {
        return Err("Business code must be at most 10 characters");
    }
    if !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err("Business code must be uppercase alphanumeric only");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) || !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain letters and digits");
    }
    Ok(())
}

/// Validate phone number (8-15 digits, optional leading +, separators allowed)
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-'))
    {
        return Err("Phone number may only contain digits, spaces and dashes");
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(8..=15).contains(&digits) {
        return Err("Phone number must have 8-15 digits");
    }
    Ok(())
}

// ============================================================================
// Tax Registration
// ============================================================================

const GSTIN_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Validate a GSTIN (15 chars: state code, PAN, entity, `Z`, checksum)
pub fn validate_gstin(gstin: &str) -> Result<(), &'static str> {
    let chars: Vec<char> = gstin.chars().collect();
    if chars.len() != 15 {
        return Err("GSTIN must be 15 characters");
    }
    if !chars[..2].iter().all(|c| c.is_ascii_digit()) {
        return Err("GSTIN must start with a two-digit state code");
    }
    if !chars.iter().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()) {
        return Err("GSTIN must be uppercase alphanumeric");
    }
    if chars[13] != 'Z' {
        return Err("GSTIN 14th character must be 'Z'");
    }
    if gstin_check_char(&chars[..14]) != Some(chars[14]) {
        return Err("GSTIN checksum mismatch");
    }
    Ok(())
}

/// Checksum character over the first 14 characters (base-36 Luhn variant)
fn gstin_check_char(body: &[char]) -> Option<char> {
    let mut sum = 0u32;
    for (i, c) in body.iter().enumerate() {
        let value = GSTIN_CHARSET.find(*c)? as u32;
        let factor = if i % 2 == 0 { 1 } else { 2 };
        let product = value * factor;
        sum += product / 36 + product % 36;
    }
    let check = (36 - sum % 36) % 36;
    GSTIN_CHARSET.chars().nth(check as usize)
}
