//! # Transaction Module
//!
//! Validation, canonical encoding, signing, and verification of wallet
//! transactions. A [`Transaction`] becomes a [`SignedTransaction`] only by
//! going through [`TransactionSigner::sign`].
//!
//! ## Architecture
//!
//! ```text
//! types.rs        : Transaction, SignedTransaction, SubmissionPayload
//! validation.rs   : Amount, currency, and nonce rules
//! canonical.rs    : "amount|currency|nonce" payload encoding
//! signing.rs      : TransactionSigner and the SignError taxonomy
//! verification.rs : Remote-verifier logic over a SubmissionPayload
//! ```

pub mod canonical;
pub mod signing;
pub mod types;
pub mod validation;
pub mod verification;

pub use canonical::{canonicalize, CanonicalPayload};
pub use signing::{SignError, TransactionSigner};
pub use types::{SignedTransaction, SubmissionPayload, Transaction};
pub use validation::validate_transaction;
pub use verification::{verify_signed, verify_submission, VerificationError};
