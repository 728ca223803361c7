//! Verification of submission payloads, as a remote backend performs it.
//!
//! Checks run cheapest first: field validation, public key decoding,
//! signature decoding, then ECDSA verification over the recomputed
//! canonical payload. Nonce freshness is the backend's own concern and is
//! not checked here.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;

use super::canonical::canonicalize;
use super::types::{SignedTransaction, SubmissionPayload, Transaction};
use super::validation::validate_transaction;
use crate::custody::PublicKey;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// The transaction fields would never have been signed.
    #[error("invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    /// The public key is not base64 SPKI DER for a supported curve.
    #[error("invalid public key: {reason}")]
    InvalidPublicKey { reason: String },

    /// The signature is not valid base64.
    #[error("malformed signature: {reason}")]
    MalformedSignature { reason: String },

    /// The signature does not verify over this transaction with this key.
    #[error("signature does not verify against public key {fingerprint}")]
    InvalidSignature { fingerprint: String },
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify a submission payload end to end.
pub fn verify_submission(payload: &SubmissionPayload) -> Result<(), VerificationError> {
    let public_key = PublicKey::from_base64(&payload.public_key).map_err(|e| {
        VerificationError::InvalidPublicKey {
            reason: e.to_string(),
        }
    })?;
    verify_transaction_signature(&public_key, &payload.transaction, &payload.signature)
}

/// Verify a [`SignedTransaction`] against a known public key.
pub fn verify_signed(
    public_key: &PublicKey,
    signed: &SignedTransaction,
) -> Result<(), VerificationError> {
    verify_transaction_signature(public_key, signed.transaction(), signed.signature())
}

fn verify_transaction_signature(
    public_key: &PublicKey,
    tx: &Transaction,
    signature_b64: &str,
) -> Result<(), VerificationError> {
    validate_transaction(tx).map_err(|reason| VerificationError::InvalidTransaction { reason })?;

    let signature = BASE64
        .decode(signature_b64)
        .map_err(|e| VerificationError::MalformedSignature {
            reason: e.to_string(),
        })?;

    let message = canonicalize(tx.amount(), tx.currency(), tx.nonce());
    if !public_key.verify(&message, &signature) {
        return Err(VerificationError::InvalidSignature {
            fingerprint: public_key.fingerprint(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
