//! Field validation, run by the signer before anything is mutated.
//!
//! Amount grammar: `DIGITS ["." DIGITS]`, `"." DIGITS`, or `DIGITS "."`.
//! ASCII digits only. No sign, exponent, whitespace, or grouping. At least
//! one non-zero digit. The amount is checked, never rewritten.

use super::types::Transaction;
use crate::config::{CANONICAL_DELIMITER, MAX_AMOUNT_LENGTH, MAX_FRACTION_DIGITS, MAX_NONCE};

/// Check a transaction, returning a human-readable reason on failure.
pub fn validate_transaction(tx: &Transaction) -> Result<(), String> {
    validate_amount(tx.amount())?;
    validate_currency(tx.currency())?;
    validate_nonce(tx.nonce())
}

/// Positive decimal, at most [`MAX_FRACTION_DIGITS`] fractional digits and
/// [`MAX_AMOUNT_LENGTH`] characters.
pub fn validate_amount(amount: &str) -> Result<(), String> {
    if amount.is_empty() {
        return Err("amount is empty".into());
    }
    if amount.len() > MAX_AMOUNT_LENGTH {
        return Err(format!(
            "amount exceeds {MAX_AMOUNT_LENGTH} characters ({})",
            amount.len()
        ));
    }

    let (integer, fraction) = match amount.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (amount, None),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(integer) || !fraction.map_or(true, all_digits) {
        return Err(format!("amount is not a plain decimal number: {amount:?}"));
    }
    let fraction = fraction.unwrap_or("");
    if integer.is_empty() && fraction.is_empty() {
        return Err(format!("amount has no digits: {amount:?}"));
    }
    if fraction.len() > MAX_FRACTION_DIGITS {
        return Err(format!(
            "amount has {} fractional digits (max {MAX_FRACTION_DIGITS})",
            fraction.len()
        ));
    }
    if !integer.bytes().chain(fraction.bytes()).any(|b| b != b'0') {
        return Err("amount must be positive".into());
    }
    Ok(())
}

/// Non-blank, no canonical delimiter, no control characters.
pub fn validate_currency(currency: &str) -> Result<(), String> {
    if currency.trim().is_empty() {
        return Err("currency is empty".into());
    }
    if currency.contains(CANONICAL_DELIMITER) {
        return Err(format!("currency must not contain '{CANONICAL_DELIMITER}'"));
    }
    if currency.chars().any(char::is_control) {
        return Err("currency contains control characters".into());
    }
    Ok(())
}

/// Nonces must fit a signed 64-bit integer.
pub fn validate_nonce(nonce: u64) -> Result<(), String> {
    if nonce > MAX_NONCE {
        return Err(format!("nonce {nonce} exceeds maximum {MAX_NONCE}"));
    }
    Ok(())
}
