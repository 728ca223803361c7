//! # Device Credential
//!
//! The vault seals the private scalar under a key-encryption key (KEK)
//! derived from the device credential. Changing the credential changes the
//! KEK, which makes the sealed key permanently unusable: that is the
//! invalidation behaviour the custodian reports as `KeyInvalidated`.
//!
//! Passphrases go through Argon2id with a per-store random salt kept in the
//! metadata tree. Operators who manage their own 32-byte secret can skip the
//! KDF with [`DeviceCredential::from_key_bytes`].

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{
    AES_KEY_LENGTH, ARGON2_ITERATIONS, ARGON2_MEMORY_KIB, ARGON2_PARALLELISM,
    CREDENTIAL_SALT_LENGTH,
};
use crate::crypto::domain_separated_hash;
use crate::storage::{DbError, WardenDb};

const FINGERPRINT_CONTEXT: &str = "warden/credential-fingerprint";
const SALT_METADATA_KEY: &str = "credential_salt";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential key derivation failed")]
    Derivation,

    #[error("stored credential salt is corrupt ({0} bytes)")]
    CorruptSalt(usize),

    #[error("credential storage error: {0}")]
    Storage(#[from] DbError),
}

/// Secret that unlocks the sealed signing key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DeviceCredential {
    kek: [u8; AES_KEY_LENGTH],
}

impl DeviceCredential {
    /// Use a 32-byte secret directly as the KEK.
    pub fn from_key_bytes(bytes: [u8; AES_KEY_LENGTH]) -> Self {
        Self { kek: bytes }
    }

    /// Derive the KEK from a passphrase with Argon2id.
    pub fn from_passphrase(
        passphrase: &str,
        salt: &[u8; CREDENTIAL_SALT_LENGTH],
    ) -> Result<Self, CredentialError> {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(AES_KEY_LENGTH),
        )
        .map_err(|_| CredentialError::Derivation)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut kek = [0u8; AES_KEY_LENGTH];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut kek)
            .map_err(|_| CredentialError::Derivation)?;
        Ok(Self { kek })
    }

    pub(crate) fn kek(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.kek
    }

    /// One-way fingerprint of the KEK, stored beside the sealed key so a
    /// credential change is detected before any decryption is attempted.
    pub fn fingerprint(&self) -> [u8; 32] {
        domain_separated_hash(FINGERPRINT_CONTEXT, &self.kek)
    }
}

impl fmt::Debug for DeviceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceCredential({}, <redacted>)",
            hex::encode(&self.fingerprint()[..4])
        )
    }
}

/// Return the store's KDF salt, creating and persisting one on first use.
pub fn load_or_create_salt(db: &WardenDb) -> Result<[u8; CREDENTIAL_SALT_LENGTH], CredentialError> {
    if let Some(raw) = db.get_metadata(SALT_METADATA_KEY)? {
        return <[u8; CREDENTIAL_SALT_LENGTH]>::try_from(raw.as_slice())
            .map_err(|_| CredentialError::CorruptSalt(raw.len()));
    }

    let mut salt = [0u8; CREDENTIAL_SALT_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    db.put_metadata(SALT_METADATA_KEY, &salt)?;
    tracing::debug!("created credential salt");
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; CREDENTIAL_SALT_LENGTH] = [7u8; CREDENTIAL_SALT_LENGTH];

    #[test]
    fn passphrase_derivation_is_deterministic() {
        let a = DeviceCredential::from_passphrase("correct horse", &SALT).unwrap();
        let b = DeviceCredential::from_passphrase("correct horse", &SALT).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn different_passphrase_different_kek() {
        let a = DeviceCredential::from_passphrase("correct horse", &SALT).unwrap();
        let b = DeviceCredential::from_passphrase("battery staple", &SALT).unwrap();
        assert_ne!(a.kek(), b.kek());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn different_salt_different_kek() {
        let a = DeviceCredential::from_passphrase("pw", &SALT).unwrap();
        let b = DeviceCredential::from_passphrase("pw", &[8u8; CREDENTIAL_SALT_LENGTH]).unwrap();
        assert_ne!(a.kek(), b.kek());
    }

    #[test]
    fn fingerprint_is_not_the_kek() {
        let c = DeviceCredential::from_key_bytes([9u8; 32]);
        assert_ne!(&c.fingerprint(), c.kek());
    }

    #[test]
    fn debug_redacts() {
        let c = DeviceCredential::from_key_bytes([0xAB; 32]);
        let dbg = format!("{c:?}");
        assert!(dbg.contains("redacted"));
        assert!(!dbg.contains(&"ab".repeat(32)));
    }

    #[test]
    fn salt_is_created_once() {
        let db = WardenDb::open_temporary().unwrap();
        let first = load_or_create_salt(&db).unwrap();
        let second = load_or_create_salt(&db).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_salt_reported() {
        let db = WardenDb::open_temporary().unwrap();
        db.put_metadata(SALT_METADATA_KEY, &[1, 2, 3]).unwrap();
        assert!(matches!(
            load_or_create_salt(&db),
            Err(CredentialError::CorruptSalt(3))
        ));
    }
}
