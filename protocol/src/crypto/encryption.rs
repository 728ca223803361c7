//! # AES-256-GCM Sealing
//!
//! Authenticated encryption for key material at rest. The vault seals the
//! private scalar with a key-encryption key derived from the device
//! credential; anything that tampers with the sealed record, or any attempt
//! to open it under a different credential, fails authentication.
//!
//! ## Nonce management
//!
//! Random 96-bit nonces from `OsRng`. A key-encryption key seals at most a
//! handful of records over its lifetime, so the birthday bound is irrelevant.
//!
//! ## Wire format
//!
//! [`seal`] returns `nonce || ciphertext || tag` as a single `Vec<u8>`;
//! [`open`] expects the same layout. The associated data is authenticated
//! but not stored; the caller must supply the same bytes on both sides.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors that can occur during sealing/opening.
///
/// Deliberately vague. "Wrong key" and "corrupted ciphertext" look the same
/// from the outside.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short: must be at least {AES_NONCE_LENGTH} bytes")]
    CiphertextTooShort,
}

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it.
pub fn seal(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data previously produced by [`seal`] with the same `aad`.
pub fn open(key: &[u8; AES_KEY_LENGTH], data: &[u8], aad: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn seal_then_open() {
        let sealed = seal(&KEY, b"scalar bytes", b"alias").unwrap();
        assert_eq!(open(&KEY, &sealed, b"alias").unwrap(), b"scalar bytes");
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal(&KEY, b"scalar bytes", b"alias").unwrap();
        let other = [0x43; 32];
        assert_eq!(
            open(&other, &sealed, b"alias"),
            Err(EncryptionError::DecryptFailed)
        );
    }

    #[test]
    fn wrong_aad_fails() {
        let sealed = seal(&KEY, b"scalar bytes", b"alias").unwrap();
        assert_eq!(
            open(&KEY, &sealed, b"other_alias"),
            Err(EncryptionError::DecryptFailed)
        );
    }

    #[test]
    fn tampering_is_detected() {
        let mut sealed = seal(&KEY, b"scalar bytes", b"alias").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open(&KEY, &sealed, b"alias").is_err());
    }

    #[test]
    fn nonces_differ_between_seals() {
        let a = seal(&KEY, b"same", b"").unwrap();
        let b = seal(&KEY, b"same", b"").unwrap();
        assert_ne!(a[..AES_NONCE_LENGTH], b[..AES_NONCE_LENGTH]);
    }

    #[test]
    fn short_input_rejected() {
        assert_eq!(
            open(&KEY, &[0u8; 4], b""),
            Err(EncryptionError::CiphertextTooShort)
        );
    }
}
