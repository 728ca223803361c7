//! # Hashing Utilities
//!
//! SHA-256, and a domain-separated variant. Domain separation keeps a
//! credential fingerprint from ever colliding with a gate digest computed
//! over the same input.

use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over `len(context) || context || data`.
///
/// The length prefix stops `("ab", "c")` and `("a", "bc")` from hashing to
/// the same value.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update((context.len() as u64).to_be_bytes());
    hasher.update(context.as_bytes());
    hasher.update(data);
    hasher.finalize().into()
}
