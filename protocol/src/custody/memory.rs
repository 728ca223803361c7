//! In-memory [`KeyCustodian`] for tests and demos.
//!
//! Keys are derived deterministically from a seed and a generation counter,
//! so two custodians built from the same seed produce the same sequence of
//! public keys. Nothing is persisted. The hooks [`InMemoryCustodian::invalidate`]
//! and [`InMemoryCustodian::expire_authentication`] let tests drive the
//! failure modes a real secure store produces.

use parking_lot::RwLock;

use super::auth::AuthWindow;
use super::keys::{EcSigningKey, PublicKey, SignatureCurve};
use super::{CustodyError, KeyCustodian, KeyParams, KeySignature};
use crate::crypto::sha256;
use crate::transaction::canonical::CanonicalPayload;

struct ActiveKey {
    key: EcSigningKey,
    params: KeyParams,
    invalidated: bool,
}

#[derive(Default)]
struct State {
    active: Option<ActiveKey>,
    generation: u64,
}

pub struct InMemoryCustodian {
    seed: [u8; 32],
    has_credential: bool,
    state: RwLock<State>,
    window: AuthWindow,
}

impl InMemoryCustodian {
    pub fn new(seed: &[u8]) -> Self {
        Self {
            seed: sha256(seed),
            has_credential: true,
            state: RwLock::new(State::default()),
            window: AuthWindow::new(),
        }
    }

    /// A custodian on a device with no credential configured: generating an
    /// authentication-gated key fails with `KeyGeneration`.
    pub fn without_credential(seed: &[u8]) -> Self {
        Self {
            has_credential: false,
            ..Self::new(seed)
        }
    }

    /// Mark the active key permanently unusable, as a credential change
    /// would.
    pub fn invalidate(&self) {
        if let Some(active) = self.state.write().active.as_mut() {
            active.invalidated = true;
        }
    }

    /// Close the authentication window now.
    pub fn expire_authentication(&self) {
        self.window.expire();
    }

    fn derive(&self, curve: SignatureCurve, generation: u64) -> EcSigningKey {
        let tag: u8 = match curve {
            SignatureCurve::P256 => 0x01,
            SignatureCurve::Secp256k1 => 0x02,
        };
        let mut counter: u32 = 0;
        loop {
            let mut material = Vec::with_capacity(32 + 8 + 1 + 4);
            material.extend_from_slice(&self.seed);
            material.extend_from_slice(&generation.to_be_bytes());
            material.push(tag);
            material.extend_from_slice(&counter.to_be_bytes());
            let candidate = zeroize::Zeroizing::new(sha256(&material));
            if let Some(key) = EcSigningKey::from_scalar(curve, candidate.as_ref()) {
                return key;
            }
            // Out-of-range scalar: vanishingly rare, try the next counter.
            counter += 1;
        }
    }
}

impl KeyCustodian for InMemoryCustodian {
    fn generate_key_pair(&self, params: &KeyParams) -> Result<PublicKey, CustodyError> {
        params.validate()?;
        if params.auth_validity.is_some() && !self.has_credential {
            return Err(CustodyError::KeyGeneration(
                "no device credential configured".into(),
            ));
        }

        let mut state = self.state.write();
        state.active = None;
        state.generation += 1;
        let key = self.derive(params.curve, state.generation);
        let public_key = key.public_key()?;
        state.active = Some(ActiveKey {
            key,
            params: *params,
            invalidated: false,
        });
        Ok(public_key)
    }

    fn public_key(&self) -> Result<PublicKey, CustodyError> {
        let state = self.state.read();
        let active = state.active.as_ref().ok_or(CustodyError::KeyNotFound)?;
        active.key.public_key()
    }

    fn key_exists(&self) -> bool {
        self.state.read().active.is_some()
    }

    fn sign(&self, payload: &CanonicalPayload) -> Result<KeySignature, CustodyError> {
        let state = self.state.read();
        let active = state.active.as_ref().ok_or(CustodyError::KeyNotFound)?;
        if active.invalidated {
            return Err(CustodyError::KeyInvalidated);
        }
        if let Some(validity) = active.params.auth_validity {
            if !self.window.is_open(validity) {
                return Err(CustodyError::AuthenticationRequired);
            }
        }
        Ok(KeySignature {
            der: active.key.sign(payload.as_bytes()),
            public_key: active.key.public_key()?,
        })
    }

    fn record_authentication(&self) {
        self.window.record();
    }
}

impl std::fmt::Debug for InMemoryCustodian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryCustodian")
            .field("generation", &state.generation)
            .field("key_present", &state.active.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> CanonicalPayload {
        CanonicalPayload::from_bytes(b"100.50|USD|0".to_vec())
    }

    #[test]
    fn same_seed_same_keys() {
        let a = InMemoryCustodian::new(b"seed");
        let b = InMemoryCustodian::new(b"seed");
        let params = KeyParams::without_authentication();
        assert_eq!(
            a.generate_key_pair(&params).unwrap(),
            b.generate_key_pair(&params).unwrap()
        );
        assert_eq!(
            a.generate_key_pair(&params).unwrap(),
            b.generate_key_pair(&params).unwrap()
        );
    }

    #[test]
    fn each_generation_is_a_new_key() {
        let c = InMemoryCustodian::new(b"seed");
        let params = KeyParams::without_authentication();
        let first = c.generate_key_pair(&params).unwrap();
        let second = c.generate_key_pair(&params).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn sign_requires_key() {
        let c = InMemoryCustodian::new(b"seed");
        assert!(!c.key_exists());
        assert!(matches!(c.sign(&payload()), Err(CustodyError::KeyNotFound)));
    }

    #[test]
    fn invalidation_is_terminal_until_regenerated() {
        let c = InMemoryCustodian::new(b"seed");
        let params = KeyParams::without_authentication();
        c.generate_key_pair(&params).unwrap();
        c.invalidate();
        assert!(c.key_exists());
        assert!(matches!(c.sign(&payload()), Err(CustodyError::KeyInvalidated)));
        c.generate_key_pair(&params).unwrap();
        assert!(c.sign(&payload()).is_ok());
    }

    #[test]
    fn auth_window() {
        let c = InMemoryCustodian::new(b"seed");
        c.generate_key_pair(&KeyParams::default()).unwrap();
        assert!(matches!(
            c.sign(&payload()),
            Err(CustodyError::AuthenticationRequired)
        ));
        c.record_authentication();
        assert!(c.sign(&payload()).is_ok());
        c.expire_authentication();
        assert!(matches!(
            c.sign(&payload()),
            Err(CustodyError::AuthenticationRequired)
        ));
    }

    #[test]
    fn no_credential_rejects_gated_keys() {
        let c = InMemoryCustodian::without_credential(b"seed");
        assert!(matches!(
            c.generate_key_pair(&KeyParams::default()),
            Err(CustodyError::KeyGeneration(_))
        ));
        assert!(!c.key_exists());
        assert!(c
            .generate_key_pair(&KeyParams::without_authentication())
            .is_ok());
    }

    #[test]
    fn signatures_verify() {
        let c = InMemoryCustodian::new(b"seed");
        let pk = c
            .generate_key_pair(
                &KeyParams::without_authentication().with_curve(SignatureCurve::Secp256k1),
            )
            .unwrap();
        let sig = c.sign(&payload()).unwrap();
        assert_eq!(sig.public_key, pk);
        assert!(pk.verify(b"100.50|USD|0", &sig.der));
    }
}
