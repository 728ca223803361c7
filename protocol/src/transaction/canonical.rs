//! Canonical signing payload: `"{amount}|{currency}|{nonce}"` in UTF-8.
//!
//! Fields are concatenated verbatim with no escaping; validation keeps the
//! delimiter out of the currency, and the amount grammar excludes it.
//! The nonce is rendered in base-10 without leading zeros.

use super::types::Transaction;
use crate::config::CANONICAL_DELIMITER;

/// The canonical byte encoding of the three transaction fields.
pub fn canonicalize(amount: &str, currency: &str, nonce: u64) -> Vec<u8> {
    format!("{amount}{CANONICAL_DELIMITER}{currency}{CANONICAL_DELIMITER}{nonce}").into_bytes()
}

/// Bytes that are allowed to reach a custodian's signing primitive.
///
/// Constructible only inside this crate, so callers cannot bypass
/// validation and nonce consumption by handing raw bytes to a custodian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPayload {
    bytes: Vec<u8>,
}

impl CanonicalPayload {
    pub(crate) fn from_transaction(tx: &Transaction) -> Self {
        Self {
            bytes: canonicalize(tx.amount(), tx.currency(), tx.nonce()),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
