//! # Signing Authority Configuration & Constants
//!
//! Every magic number in Warden lives here. The canonical payload format and
//! the validation limits are part of the wire contract with remote verifiers:
//! changing them after deployment invalidates every verifier in the field, so
//! treat this file as append-only.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Protocol version string reported by the node and embedded in status output.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Key Custody
// ---------------------------------------------------------------------------

/// The single alias under which the active signing key lives. There is never
/// more than one key; generating a new one replaces whatever sits here.
pub const KEY_ALIAS: &str = "warden_signing_key";

/// Default authentication validity window. After a successful authentication,
/// the key may be used for this long before the gate must be passed again.
pub const DEFAULT_AUTH_VALIDITY: Duration = Duration::from_secs(30);

/// Signature scheme label for the default curve.
pub const SIGNING_ALGORITHM: &str = "SHA256withECDSA";

/// Length of a raw EC scalar for both supported curves.
pub const EC_SCALAR_LENGTH: usize = 32;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve. Not sixteen.
pub const AES_NONCE_LENGTH: usize = 12;

/// Salt length for Argon2id credential derivation.
pub const CREDENTIAL_SALT_LENGTH: usize = 16;

/// Argon2id memory cost in KiB (OWASP minimum recommendation).
pub const ARGON2_MEMORY_KIB: u32 = 19 * 1024;

/// Argon2id iteration count.
pub const ARGON2_ITERATIONS: u32 = 2;

/// Argon2id lane count.
pub const ARGON2_PARALLELISM: u32 = 1;

// ---------------------------------------------------------------------------
// Transaction Limits
// ---------------------------------------------------------------------------

/// Maximum length of the amount string, in characters.
pub const MAX_AMOUNT_LENGTH: usize = 50;

/// Maximum number of fractional digits in an amount. Eighteen covers wei.
pub const MAX_FRACTION_DIGITS: usize = 18;

/// Largest nonce accepted. Verifiers store nonces as signed 64-bit integers,
/// so anything above `i64::MAX` would not survive the round trip.
pub const MAX_NONCE: u64 = i64::MAX as u64;

/// Field delimiter in the canonical signing payload.
pub const CANONICAL_DELIMITER: char = '|';

// ---------------------------------------------------------------------------
// Storage Layout
// ---------------------------------------------------------------------------

/// sled tree holding the nonce ledger.
pub const LEDGER_TREE: &str = "ledger";

/// sled tree holding sealed key records, keyed by alias.
pub const KEYS_TREE: &str = "keys";

/// sled tree holding store-level metadata (credential salt, etc.).
pub const METADATA_TREE: &str = "metadata";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_ceiling_fits_signed_64_bit() {
        assert_eq!(MAX_NONCE, 9_223_372_036_854_775_807);
        assert!(i64::try_from(MAX_NONCE).is_ok());
    }

    #[test]
    fn delimiter_is_ascii_pipe() {
        assert!(CANONICAL_DELIMITER.is_ascii());
        assert_eq!(CANONICAL_DELIMITER as u8, b'|');
    }
}
