//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around audited RustCrypto implementations:
//!
//! - **AES-256-GCM** for sealing key material at rest.
//! - **SHA-256** for credential fingerprints and gate digests.
//!
//! ECDSA itself lives in [`crate::custody::keys`], next to the only code that
//! is allowed to touch a private scalar.

pub mod encryption;
pub mod hash;

pub use encryption::{open, seal, EncryptionError};
pub use hash::{domain_separated_hash, sha256};
