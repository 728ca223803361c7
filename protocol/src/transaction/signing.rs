//! The transaction signer: the only path from a [`Transaction`] to a
//! signature.
//!
//! `sign` runs, in order:
//!
//! 1. Validate the fields. Failure mutates nothing.
//! 2. Check-and-commit the nonce inside the signer's critical section.
//!    Failure touches no key.
//! 3. Canonicalize to `amount|currency|nonce`.
//! 4. Ask the custodian for a signature over the canonical payload.
//! 5. Base64-encode the DER signature and attach the public key the
//!    custodian signed with.
//!
//! The nonce commit strictly precedes key access. If the custodian then
//! fails (no key, authentication window closed, key invalidated) the nonce
//! stays consumed: a committed nonce is never rolled back, so a retry must
//! use a higher one.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use super::canonical::CanonicalPayload;
use super::types::{SignedTransaction, SubmissionPayload, Transaction};
use super::validation::validate_transaction;
use crate::custody::{AuthenticationGate, CustodyError, KeyCustodian, KeyParams, PublicKey};
use crate::ledger::{LedgerError, NonceLedger};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Everything the signer can report to its caller.
///
/// An exact nonce repeat is `NonceTooLow` with `rejected == last_accepted`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignError {
    #[error("invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    #[error("nonce {rejected} rejected: last accepted nonce is {last_accepted}")]
    NonceTooLow { rejected: u64, last_accepted: u64 },

    #[error("no signing key exists; generate one first")]
    KeyNotFound,

    #[error("user authentication required")]
    AuthenticationRequired,

    #[error("signing key permanently invalidated; regenerate the key")]
    KeyInvalidated,

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SignError {
    /// Stable machine-readable name, used in API error bodies and metrics
    /// labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransaction { .. } => "invalid_transaction",
            Self::NonceTooLow { .. } => "nonce_too_low",
            Self::KeyNotFound => "key_not_found",
            Self::AuthenticationRequired => "authentication_required",
            Self::KeyInvalidated => "key_invalidated",
            Self::KeyGeneration(_) => "key_generation",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<CustodyError> for SignError {
    fn from(e: CustodyError) -> Self {
        match e {
            CustodyError::KeyNotFound => Self::KeyNotFound,
            CustodyError::AuthenticationRequired => Self::AuthenticationRequired,
            CustodyError::KeyInvalidated => Self::KeyInvalidated,
            CustodyError::KeyGeneration(reason) => Self::KeyGeneration(reason),
            CustodyError::Storage(db) => Self::Storage(db.to_string()),
        }
    }
}

impl From<LedgerError> for SignError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NonceTooLow {
                rejected,
                last_accepted,
            } => Self::NonceTooLow {
                rejected,
                last_accepted,
            },
            LedgerError::NonceOutOfRange { .. } => Self::InvalidTransaction {
                reason: e.to_string(),
            },
            LedgerError::Storage(db) => Self::Storage(db.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionSigner
// ---------------------------------------------------------------------------

/// Coordinates validation, nonce consumption, and custodian signing.
pub struct TransactionSigner<C: KeyCustodian> {
    custodian: Arc<C>,
    ledger: Arc<NonceLedger>,
    gate: Arc<dyn AuthenticationGate>,
    /// Serializes the nonce check-and-commit across all callers of this
    /// signer.
    critical: Mutex<()>,
}

impl<C: KeyCustodian> TransactionSigner<C> {
    pub fn new(
        custodian: Arc<C>,
        ledger: Arc<NonceLedger>,
        gate: Arc<dyn AuthenticationGate>,
    ) -> Self {
        Self {
            custodian,
            ledger,
            gate,
            critical: Mutex::new(()),
        }
    }

    pub fn custodian(&self) -> &Arc<C> {
        &self.custodian
    }

    pub fn ledger(&self) -> &Arc<NonceLedger> {
        &self.ledger
    }

    /// Validate, consume the nonce, and sign.
    pub fn sign(&self, tx: &Transaction) -> Result<SignedTransaction, SignError> {
        validate_transaction(tx).map_err(|reason| SignError::InvalidTransaction { reason })?;

        {
            let _critical = self.critical.lock();
            self.ledger.check_and_commit(tx.nonce())?;
        }

        let payload = CanonicalPayload::from_transaction(tx);
        let signature = self.custodian.sign(&payload).map_err(|e| {
            tracing::warn!(
                nonce = tx.nonce(),
                error = %e,
                "nonce consumed but signing failed; retry with a higher nonce"
            );
            SignError::from(e)
        })?;

        tracing::debug!(nonce = tx.nonce(), currency = tx.currency(), "transaction signed");
        Ok(SignedTransaction::new(
            tx.clone(),
            BASE64.encode(&signature.der),
            signature.public_key,
        ))
    }

    /// Run the configured authentication gate and, on success, open the
    /// custodian's authentication window.
    pub fn authenticate(&self) -> Result<(), SignError> {
        self.authenticate_with(self.gate.as_ref())
    }

    /// Like [`authenticate`](Self::authenticate) with a caller-supplied gate.
    pub fn authenticate_with(&self, gate: &dyn AuthenticationGate) -> Result<(), SignError> {
        if !gate.authenticate() {
            tracing::info!("user authentication failed");
            return Err(SignError::AuthenticationRequired);
        }
        self.custodian.record_authentication();
        tracing::debug!("authentication window opened");
        Ok(())
    }

    /// Replace the signing key. The nonce ledger is left untouched.
    pub fn generate_key_pair(&self, params: &KeyParams) -> Result<PublicKey, SignError> {
        Ok(self.custodian.generate_key_pair(params)?)
    }

    pub fn public_key(&self) -> Result<PublicKey, SignError> {
        Ok(self.custodian.public_key()?)
    }

    pub fn key_exists(&self) -> bool {
        self.custodian.key_exists()
    }

    /// The smallest nonce `sign` would currently accept.
    pub fn peek_next_nonce(&self) -> Result<u64, SignError> {
        Ok(self.ledger.peek_next()?)
    }

    /// [`sign`](Self::sign), then
    /// [`to_submission_payload`](SignedTransaction::to_submission_payload).
    pub fn sign_for_submission(&self, tx: &Transaction) -> Result<SubmissionPayload, SignError> {
        Ok(self.sign(tx)?.to_submission_payload())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
