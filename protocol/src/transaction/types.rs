//! Value types that cross the signer boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::custody::PublicKey;

/// A transaction as submitted for signing.
///
/// Immutable once constructed. The constructor accepts anything; the signer
/// validates before doing any work, so an invalid transaction can exist but
/// can never be signed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    amount: String,
    currency: String,
    nonce: u64,
}

impl Transaction {
    pub fn new(amount: impl Into<String>, currency: impl Into<String>, nonce: u64) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.into(),
            nonce,
        }
    }

    /// Decimal amount, exactly as given. Never normalized.
    pub fn amount(&self) -> &str {
        &self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (nonce {})", self.amount, self.currency, self.nonce)
    }
}

/// A transaction, its base64 DER signature, and the key that signed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    transaction: Transaction,
    signature: String,
    public_key: PublicKey,
}

impl SignedTransaction {
    pub(crate) fn new(transaction: Transaction, signature: String, public_key: PublicKey) -> Self {
        Self {
            transaction,
            signature,
            public_key,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Standard base64 (padded, unwrapped) of the DER-encoded signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The key that produced [`signature`](Self::signature), which is not
    /// necessarily the custodian's current key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// The submission payload for the backend.
    pub fn to_submission_payload(&self) -> SubmissionPayload {
        SubmissionPayload {
            transaction: self.transaction.clone(),
            signature: self.signature.clone(),
            public_key: self.public_key.to_base64(),
        }
    }
}

/// What the remote backend receives.
///
/// ```json
/// { "transaction": {"amount": "100.50", "currency": "USD", "nonce": 0},
///   "signature": "<base64 DER>", "publicKey": "<base64 SPKI DER>" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub transaction: Transaction,
    pub signature: String,
    pub public_key: String,
}

impl SubmissionPayload {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getters_return_fields_verbatim() {
        let tx = Transaction::new("0100.500", "USD", 7);
        assert_eq!(tx.amount(), "0100.500");
        assert_eq!(tx.currency(), "USD");
        assert_eq!(tx.nonce(), 7);
    }

    #[test]
    fn submission_payload_uses_camel_case() {
        let payload = SubmissionPayload {
            transaction: Transaction::new("100.50", "USD", 0),
            signature: "c2ln".into(),
            public_key: "cGs=".into(),
        };
        let json = payload.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"transaction":{"amount":"100.50","currency":"USD","nonce":0},"signature":"c2ln","publicKey":"cGs="}"#
        );
        assert_eq!(SubmissionPayload::from_json(&json).unwrap(), payload);
    }

    #[test]
    fn transaction_deserializes_from_request_body() {
        let tx: Transaction =
            serde_json::from_str(r#"{"amount":"1.5","currency":"EUR","nonce":42}"#).unwrap();
        assert_eq!(tx, Transaction::new("1.5", "EUR", 42));
    }
}
