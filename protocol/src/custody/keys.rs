//! # ECDSA Key Material
//!
//! NIST P-256 with SHA-256 is the default. secp256k1 with SHA-256 is the
//! documented alternative for verifiers that live on a blockchain.
//!
//! Signing is deterministic (RFC 6979): the same key and payload always
//! produce the same signature, so there is no per-signature randomness to
//! get wrong. Signatures are DER-encoded; public keys are exported as X.509
//! SubjectPublicKeyInfo DER, which carries the curve OID and lets a verifier
//! pick the right curve without being told.
//!
//! ## Security considerations
//!
//! - [`EcSigningKey`] is crate-private. The only ways out of it are a
//!   signature, a public key, or a zeroizing scalar handed to the vault for
//!   sealing.
//! - Key bytes are never logged and `Debug` never prints them.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use k256::ecdsa::{
    Signature as K256Signature, SigningKey as K256SigningKey, VerifyingKey as K256VerifyingKey,
};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{
    Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
};
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

use super::CustodyError;
use crate::config::EC_SCALAR_LENGTH;
use crate::crypto::sha256;

// ---------------------------------------------------------------------------
// SignatureCurve
// ---------------------------------------------------------------------------

/// Elliptic curve of the signing key. Both use ECDSA over SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureCurve {
    /// NIST P-256 / secp256r1.
    #[default]
    P256,
    /// secp256k1, for blockchain verifiers.
    Secp256k1,
}

impl fmt::Display for SignatureCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P256 => write!(f, "P-256"),
            Self::Secp256k1 => write!(f, "secp256k1"),
        }
    }
}

impl FromStr for SignatureCurve {
    type Err = KeyFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p256" | "p-256" | "secp256r1" | "prime256v1" => Ok(Self::P256),
            "secp256k1" | "k256" => Ok(Self::Secp256k1),
            other => Err(KeyFormatError::UnknownCurve(other.to_string())),
        }
    }
}

/// Errors decoding public keys or curve names from external input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyFormatError {
    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("not a P-256 or secp256k1 SubjectPublicKeyInfo")]
    UnsupportedKey,

    #[error("unknown curve: {0}")]
    UnknownCurve(String),
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// The exportable half of the signing key.
///
/// Stored as SubjectPublicKeyInfo DER. Safe to log, share, and persist.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    curve: SignatureCurve,
    spki_der: Vec<u8>,
}

impl PublicKey {
    /// Parse SubjectPublicKeyInfo DER, detecting the curve from its OID.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, KeyFormatError> {
        let curve = if P256VerifyingKey::from_public_key_der(der).is_ok() {
            SignatureCurve::P256
        } else if K256VerifyingKey::from_public_key_der(der).is_ok() {
            SignatureCurve::Secp256k1
        } else {
            return Err(KeyFormatError::UnsupportedKey);
        };
        Ok(Self {
            curve,
            spki_der: der.to_vec(),
        })
    }

    /// Parse the base64 transport form.
    pub fn from_base64(s: &str) -> Result<Self, KeyFormatError> {
        let der = BASE64
            .decode(s)
            .map_err(|_| KeyFormatError::InvalidBase64)?;
        Self::from_spki_der(&der)
    }

    /// Curve of this key.
    pub fn curve(&self) -> SignatureCurve {
        self.curve
    }

    /// SubjectPublicKeyInfo DER bytes.
    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// Standard base64 of the SPKI DER, no line wrapping.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.spki_der)
    }

    /// Short hex fingerprint (first 8 bytes of SHA-256 over the SPKI).
    /// For logs and display only.
    pub fn fingerprint(&self) -> String {
        hex::encode(&sha256(&self.spki_der)[..8])
    }

    /// Check a DER-encoded ECDSA signature over `message`.
    ///
    /// Returns `false` for anything that is not a valid signature by this
    /// key, malformed DER included.
    pub fn verify(&self, message: &[u8], signature_der: &[u8]) -> bool {
        match self.curve {
            SignatureCurve::P256 => {
                let Ok(vk) = P256VerifyingKey::from_public_key_der(&self.spki_der) else {
                    return false;
                };
                let Ok(sig) = P256Signature::from_der(signature_der) else {
                    return false;
                };
                vk.verify(message, &sig).is_ok()
            }
            SignatureCurve::Secp256k1 => {
                let Ok(vk) = K256VerifyingKey::from_public_key_der(&self.spki_der) else {
                    return false;
                };
                let Ok(sig) = K256Signature::from_der(signature_der) else {
                    return false;
                };
                vk.verify(message, &sig).is_ok()
            }
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}, {})", self.curve, self.fingerprint())
    }
}

// ---------------------------------------------------------------------------
// EcSigningKey
// ---------------------------------------------------------------------------

/// A private signing key on one of the supported curves.
///
/// Both inner key types zeroize their scalar on drop.
pub(crate) enum EcSigningKey {
    P256(P256SigningKey),
    Secp256k1(K256SigningKey),
}

impl EcSigningKey {
    /// Fresh key from the OS RNG.
    pub(crate) fn generate(curve: SignatureCurve) -> Self {
        match curve {
            SignatureCurve::P256 => Self::P256(P256SigningKey::random(&mut OsRng)),
            SignatureCurve::Secp256k1 => Self::Secp256k1(K256SigningKey::random(&mut OsRng)),
        }
    }

    /// Rebuild a key from its big-endian scalar. Fails if the bytes are not
    /// a valid non-zero scalar for `curve`.
    pub(crate) fn from_scalar(curve: SignatureCurve, scalar: &[u8]) -> Option<Self> {
        match curve {
            SignatureCurve::P256 => P256SigningKey::from_slice(scalar).ok().map(Self::P256),
            SignatureCurve::Secp256k1 => {
                K256SigningKey::from_slice(scalar).ok().map(Self::Secp256k1)
            }
        }
    }

    /// The raw scalar, for sealing. Wiped when the wrapper drops.
    pub(crate) fn scalar_bytes(&self) -> Zeroizing<[u8; EC_SCALAR_LENGTH]> {
        let mut out = Zeroizing::new([0u8; EC_SCALAR_LENGTH]);
        match self {
            Self::P256(k) => out.copy_from_slice(&k.to_bytes()),
            Self::Secp256k1(k) => out.copy_from_slice(&k.to_bytes()),
        }
        out
    }

    pub(crate) fn curve(&self) -> SignatureCurve {
        match self {
            Self::P256(_) => SignatureCurve::P256,
            Self::Secp256k1(_) => SignatureCurve::Secp256k1,
        }
    }

    /// Export the public half as SPKI.
    pub(crate) fn public_key(&self) -> Result<PublicKey, CustodyError> {
        let document = match self {
            Self::P256(k) => k.verifying_key().to_public_key_der(),
            Self::Secp256k1(k) => k.verifying_key().to_public_key_der(),
        }
        .map_err(|e| CustodyError::KeyGeneration(format!("public key export failed: {e}")))?;

        Ok(PublicKey {
            curve: self.curve(),
            spki_der: document.as_bytes().to_vec(),
        })
    }

    /// Deterministic ECDSA/SHA-256 over `message`, DER-encoded.
    pub(crate) fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::P256(k) => {
                let sig: P256Signature = k.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
            Self::Secp256k1(k) => {
                let sig: K256Signature = k.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
        }
    }
}

impl fmt::Debug for EcSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcSigningKey({}, <redacted>)", self.curve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p256_sign_verify() {
        let key = EcSigningKey::generate(SignatureCurve::P256);
        let pk = key.public_key().unwrap();
        let sig = key.sign(b"100.50|USD|0");
        assert!(pk.verify(b"100.50|USD|0", &sig));
        assert!(!pk.verify(b"100.50|USD|1", &sig));
    }

    #[test]
    fn secp256k1_sign_verify() {
        let key = EcSigningKey::generate(SignatureCurve::Secp256k1);
        let pk = key.public_key().unwrap();
        assert_eq!(pk.curve(), SignatureCurve::Secp256k1);
        let sig = key.sign(b"10|ETH|5");
        assert!(pk.verify(b"10|ETH|5", &sig));
    }

    #[test]
    fn signing_is_deterministic() {
        let key = EcSigningKey::generate(SignatureCurve::P256);
        assert_eq!(key.sign(b"same"), key.sign(b"same"));
    }

    #[test]
    fn scalar_roundtrip_preserves_identity() {
        for curve in [SignatureCurve::P256, SignatureCurve::Secp256k1] {
            let key = EcSigningKey::generate(curve);
            let restored = EcSigningKey::from_scalar(curve, key.scalar_bytes().as_ref()).unwrap();
            assert_eq!(key.public_key().unwrap(), restored.public_key().unwrap());
        }
    }

    #[test]
    fn zero_scalar_rejected() {
        assert!(EcSigningKey::from_scalar(SignatureCurve::P256, &[0u8; 32]).is_none());
    }

    #[test]
    fn spki_detects_curve() {
        let p = EcSigningKey::generate(SignatureCurve::P256).public_key().unwrap();
        let k = EcSigningKey::generate(SignatureCurve::Secp256k1).public_key().unwrap();
        assert_eq!(PublicKey::from_spki_der(p.spki_der()).unwrap().curve(), SignatureCurve::P256);
        assert_eq!(
            PublicKey::from_base64(&k.to_base64()).unwrap().curve(),
            SignatureCurve::Secp256k1
        );
    }

    #[test]
    fn p256_spki_has_standard_prefix() {
        // SEQUENCE { SEQUENCE { id-ecPublicKey, prime256v1 }, BIT STRING }
        // is 91 bytes for an uncompressed point.
        let pk = EcSigningKey::generate(SignatureCurve::P256).public_key().unwrap();
        assert_eq!(pk.spki_der().len(), 91);
        assert_eq!(pk.spki_der()[0], 0x30);
    }

    #[test]
    fn garbage_public_key_rejected() {
        assert_eq!(
            PublicKey::from_spki_der(&[1, 2, 3]),
            Err(KeyFormatError::UnsupportedKey)
        );
        assert_eq!(
            PublicKey::from_base64("***"),
            Err(KeyFormatError::InvalidBase64)
        );
    }

    #[test]
    fn malformed_signature_does_not_verify() {
        let key = EcSigningKey::generate(SignatureCurve::P256);
        let pk = key.public_key().unwrap();
        assert!(!pk.verify(b"msg", &[0x30, 0x00]));
    }

    #[test]
    fn curve_names_parse() {
        assert_eq!("p256".parse::<SignatureCurve>().unwrap(), SignatureCurve::P256);
        assert_eq!("secp256r1".parse::<SignatureCurve>().unwrap(), SignatureCurve::P256);
        assert_eq!("K256".parse::<SignatureCurve>().unwrap(), SignatureCurve::Secp256k1);
        assert!("ed25519".parse::<SignatureCurve>().is_err());
    }

    #[test]
    fn debug_never_prints_scalar() {
        let key = EcSigningKey::generate(SignatureCurve::P256);
        let hex_scalar = hex::encode(key.scalar_bytes().as_ref());
        let dbg = format!("{key:?}");
        assert!(dbg.contains("redacted"));
        assert!(!dbg.contains(&hex_scalar));
    }
}
