// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Warden Protocol: Core Library
//!
//! The signing authority of a single-user wallet. It owns one asymmetric
//! signing key, signs canonical transaction payloads, and refuses to sign
//! any nonce that is not strictly greater than every nonce it has signed
//! before.
//!
//! ## Architecture
//!
//! - **custody**: Key lifecycle behind the [`KeyCustodian`](custody::KeyCustodian)
//!   capability. Private key bytes never leave it.
//! - **ledger**: The persisted `last_accepted_nonce` and its atomic
//!   check-and-commit.
//! - **transaction**: Validation, canonical encoding, the
//!   [`TransactionSigner`](transaction::TransactionSigner), and verifier logic.
//! - **crypto**: AES-256-GCM sealing and SHA-256 helpers.
//! - **storage**: sled-backed persistence.
//! - **config**: Protocol constants.
//!
//! ## Guarantees
//!
//! 1. Private key material never leaves the custodian.
//! 2. No two transactions are ever signed with the same or a non-increasing
//!    nonce, even under concurrent callers.
//! 3. A remote verifier can rebuild the signed bytes exactly from the
//!    submitted fields.

pub mod config;
pub mod crypto;
pub mod custody;
pub mod ledger;
pub mod storage;
pub mod transaction;
