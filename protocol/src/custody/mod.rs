//! # Key Custody
//!
//! The custodian owns the signing key's lifecycle: generation, existence
//! checks, public-key export, and a signing primitive. It never hands out
//! private key bytes, and its signing primitive only accepts a
//! [`CanonicalPayload`], a type nothing outside this crate can construct.
//! The only way to get a signature is therefore through the
//! [`TransactionSigner`](crate::transaction::TransactionSigner), after
//! validation and nonce consumption.
//!
//! ## Architecture
//!
//! ```text
//! keys.rs        : ECDSA key material (P-256 default, secp256k1 alternative)
//! auth.rs        : Authentication gate capability and validity window
//! credential.rs  : Device credential to key-encryption key
//! vault.rs       : Production custodian, sealed key in sled
//! memory.rs      : Deterministic in-memory custodian for tests
//! ```
//!
//! ## Key lifecycle
//!
//! ```text
//! absent ──generate──▶ present ──generate──▶ present (replaced)
//!                        │
//!                        └──credential change──▶ invalidated ──generate──▶ present
//! ```

pub mod auth;
pub mod credential;
pub mod keys;
pub mod memory;
pub mod vault;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::DEFAULT_AUTH_VALIDITY;
use crate::storage::DbError;
use crate::transaction::canonical::CanonicalPayload;

pub use auth::{AlwaysAllow, AlwaysDeny, AuthWindow, AuthenticationGate, PassphraseGate};
pub use credential::{load_or_create_salt, CredentialError, DeviceCredential};
pub use keys::{KeyFormatError, PublicKey, SignatureCurve};
pub use memory::InMemoryCustodian;
pub use vault::{KeyInfo, VaultCustodian};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the key custodian. None of them carry key material.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// No key has been generated under the managed alias.
    #[error("no signing key exists; generate one first")]
    KeyNotFound,

    /// The key requires user authentication and the validity window is
    /// closed (never opened, or expired).
    #[error("user authentication required before the key can be used")]
    AuthenticationRequired,

    /// The key was permanently invalidated (device credential changed).
    /// Terminal: the only remedy is generating a new key.
    #[error("signing key permanently invalidated; regenerate the key")]
    KeyInvalidated,

    /// The backing store refused to create the key.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("custody storage error: {0}")]
    Storage(#[from] DbError),
}

// ---------------------------------------------------------------------------
// Key Parameters
// ---------------------------------------------------------------------------

/// Parameters fixed at key generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParams {
    /// Curve of the new key.
    pub curve: SignatureCurve,
    /// If set, every use of the key must fall within this window after a
    /// successful authentication.
    pub auth_validity: Option<Duration>,
}

impl Default for KeyParams {
    fn default() -> Self {
        Self {
            curve: SignatureCurve::P256,
            auth_validity: Some(DEFAULT_AUTH_VALIDITY),
        }
    }
}

impl KeyParams {
    /// Default curve, no authentication requirement.
    pub fn without_authentication() -> Self {
        Self {
            auth_validity: None,
            ..Self::default()
        }
    }

    /// Returns a copy using `curve`.
    pub fn with_curve(mut self, curve: SignatureCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Returns a copy with the given authentication window.
    pub fn with_auth_validity(mut self, validity: Option<Duration>) -> Self {
        self.auth_validity = validity;
        self
    }

    /// Reject parameters no custodian can honour.
    pub(crate) fn validate(&self) -> Result<(), CustodyError> {
        if self.auth_validity == Some(Duration::ZERO) {
            return Err(CustodyError::KeyGeneration(
                "authentication validity window must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for KeyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.auth_validity {
            Some(v) => write!(f, "{} (auth window {}s)", self.curve, v.as_secs()),
            None => write!(f, "{} (no auth)", self.curve),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyCustodian
// ---------------------------------------------------------------------------

/// A DER-encoded ECDSA signature and the public key of the key that made it.
///
/// Both are read under the same lifecycle guard, so `public_key` always
/// verifies `der` even if the key is replaced right afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySignature {
    pub der: Vec<u8>,
    pub public_key: PublicKey,
}

/// Capability interface over whatever actually holds the private key.
///
/// Implementations must be safe to call from many threads, and must make
/// generation mutually exclusive with in-flight signing.
pub trait KeyCustodian: Send + Sync {
    /// Destroy any existing key and create a fresh one.
    fn generate_key_pair(&self, params: &KeyParams) -> Result<PublicKey, CustodyError>;

    /// Export the active public key.
    fn public_key(&self) -> Result<PublicKey, CustodyError>;

    /// Whether a key exists. Never fails; storage errors read as `false`.
    fn key_exists(&self) -> bool;

    /// Sign a canonical payload with the active key.
    fn sign(&self, payload: &CanonicalPayload) -> Result<KeySignature, CustodyError>;

    /// Open the authentication validity window. Called after the
    /// authentication gate reports success.
    fn record_authentication(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_require_authentication() {
        let p = KeyParams::default();
        assert_eq!(p.curve, SignatureCurve::P256);
        assert_eq!(p.auth_validity, Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_window_rejected() {
        let p = KeyParams::default().with_auth_validity(Some(Duration::ZERO));
        assert!(matches!(p.validate(), Err(CustodyError::KeyGeneration(_))));
        assert!(KeyParams::without_authentication().validate().is_ok());
    }

    #[test]
    fn display_mentions_curve() {
        let p = KeyParams::without_authentication().with_curve(SignatureCurve::Secp256k1);
        assert_eq!(p.to_string(), "secp256k1 (no auth)");
    }
}
