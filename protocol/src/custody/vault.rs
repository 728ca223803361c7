//! # Vault Custodian
//!
//! Production [`KeyCustodian`]. The private scalar is sealed with
//! AES-256-GCM under the device credential's KEK and stored in the `keys`
//! tree of the [`WardenDb`], keyed by [`KEY_ALIAS`]. The alias is the AEAD
//! associated data, so a record copied under another key fails to open.
//!
//! The record also carries the credential fingerprint taken at generation.
//! A custodian opened with a different credential sees a fingerprint
//! mismatch and reports [`CustodyError::KeyInvalidated`] without attempting
//! decryption. An unseal failure (tampered record) is reported the same way.
//!
//! The plaintext scalar exists only for the duration of one `sign` call and
//! is wiped on drop.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::auth::AuthWindow;
use super::credential::DeviceCredential;
use super::keys::{EcSigningKey, PublicKey, SignatureCurve};
use super::{CustodyError, KeyCustodian, KeyParams, KeySignature};
use crate::config::KEY_ALIAS;
use crate::crypto::{open, seal};
use crate::storage::{DbError, WardenDb};
use crate::transaction::canonical::CanonicalPayload;

/// What the `keys` tree stores under the alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedKeyRecord {
    curve: SignatureCurve,
    auth_validity: Option<Duration>,
    sealed_scalar: Vec<u8>,
    credential_fingerprint: [u8; 32],
    public_key_der: Vec<u8>,
    created_at: DateTime<Utc>,
}

/// Non-secret description of the stored key.
#[derive(Debug, Clone)]
pub struct KeyInfo {
    pub public_key: PublicKey,
    pub params: KeyParams,
    pub created_at: DateTime<Utc>,
    /// The current credential can no longer unseal this key.
    pub invalidated: bool,
}

/// Custodian backed by a sealed key record in [`WardenDb`].
pub struct VaultCustodian {
    db: WardenDb,
    credential: DeviceCredential,
    window: AuthWindow,
    /// Write-locked by generation, read-locked by signing.
    lifecycle: RwLock<()>,
}

impl VaultCustodian {
    /// Custodian over `db`, sealing and unsealing with `credential`.
    pub fn new(db: WardenDb, credential: DeviceCredential) -> Self {
        Self {
            db,
            credential,
            window: AuthWindow::new(),
            lifecycle: RwLock::new(()),
        }
    }

    /// Close the authentication window now.
    pub fn expire_authentication(&self) {
        self.window.expire();
    }

    /// Describe the stored key, if any.
    pub fn key_info(&self) -> Result<Option<KeyInfo>, CustodyError> {
        let _guard = self.lifecycle.read();
        let Some(record) = self.load_record()? else {
            return Ok(None);
        };
        Ok(Some(KeyInfo {
            public_key: record_public_key(&record)?,
            params: KeyParams {
                curve: record.curve,
                auth_validity: record.auth_validity,
            },
            created_at: record.created_at,
            invalidated: record.credential_fingerprint != self.credential.fingerprint(),
        }))
    }

    fn load_record(&self) -> Result<Option<SealedKeyRecord>, CustodyError> {
        Ok(self
            .db
            .get_record(self.db.keys_tree(), KEY_ALIAS.as_bytes())?)
    }

    fn unseal(&self, record: &SealedKeyRecord) -> Result<EcSigningKey, CustodyError> {
        let scalar = zeroize::Zeroizing::new(
            open(
                self.credential.kek(),
                &record.sealed_scalar,
                KEY_ALIAS.as_bytes(),
            )
            .map_err(|_| CustodyError::KeyInvalidated)?,
        );
        EcSigningKey::from_scalar(record.curve, &scalar).ok_or(CustodyError::KeyInvalidated)
    }
}

fn record_public_key(record: &SealedKeyRecord) -> Result<PublicKey, CustodyError> {
    PublicKey::from_spki_der(&record.public_key_der).map_err(|e| {
        CustodyError::Storage(DbError::Serialization(format!("stored public key: {e}")))
    })
}

impl KeyCustodian for VaultCustodian {
    fn generate_key_pair(&self, params: &KeyParams) -> Result<PublicKey, CustodyError> {
        params.validate()?;
        let _guard = self.lifecycle.write();
        let tree = self.db.keys_tree();

        let previous = tree
            .remove(KEY_ALIAS.as_bytes())
            .map_err(|e| CustodyError::KeyGeneration(format!("could not delete old key: {e}")))?;
        if previous.is_some() {
            debug!(alias = KEY_ALIAS, "deleted previous signing key");
        }

        let key = EcSigningKey::generate(params.curve);
        let public_key = key.public_key()?;
        let sealed_scalar = seal(
            self.credential.kek(),
            key.scalar_bytes().as_ref(),
            KEY_ALIAS.as_bytes(),
        )
        .map_err(|e| CustodyError::KeyGeneration(e.to_string()))?;

        let record = SealedKeyRecord {
            curve: params.curve,
            auth_validity: params.auth_validity,
            sealed_scalar,
            credential_fingerprint: self.credential.fingerprint(),
            public_key_der: public_key.spki_der().to_vec(),
            created_at: Utc::now(),
        };
        self.db
            .put_record(tree, KEY_ALIAS.as_bytes(), &record)
            .map_err(|e| CustodyError::KeyGeneration(e.to_string()))?;

        info!(
            alias = KEY_ALIAS,
            params = %params,
            fingerprint = %public_key.fingerprint(),
            "generated signing key"
        );
        Ok(public_key)
    }

    fn public_key(&self) -> Result<PublicKey, CustodyError> {
        let _guard = self.lifecycle.read();
        let record = self.load_record()?.ok_or(CustodyError::KeyNotFound)?;
        record_public_key(&record)
    }

    fn key_exists(&self) -> bool {
        let _guard = self.lifecycle.read();
        match self.load_record() {
            Ok(record) => record.is_some(),
            Err(e) => {
                warn!(error = %e, "key lookup failed");
                false
            }
        }
    }

    fn sign(&self, payload: &CanonicalPayload) -> Result<KeySignature, CustodyError> {
        let _guard = self.lifecycle.read();
        let record = self.load_record()?.ok_or(CustodyError::KeyNotFound)?;

        if record.credential_fingerprint != self.credential.fingerprint() {
            warn!(alias = KEY_ALIAS, "device credential changed; key invalidated");
            return Err(CustodyError::KeyInvalidated);
        }
        if let Some(validity) = record.auth_validity {
            if !self.window.is_open(validity) {
                return Err(CustodyError::AuthenticationRequired);
            }
        }

        let key = self.unseal(&record).map_err(|e| {
            warn!(alias = KEY_ALIAS, "sealed key failed to open");
            e
        })?;
        Ok(KeySignature {
            der: key.sign(payload.as_bytes()),
            public_key: record_public_key(&record)?,
        })
    }

    fn record_authentication(&self) {
        self.window.record();
    }
}

impl std::fmt::Debug for VaultCustodian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCustodian")
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}
