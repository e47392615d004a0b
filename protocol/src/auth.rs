//! # Signed Calls
//!
//! Every mutating call carries a [`CallSignature`]: an Ed25519 signature by
//! the caller's key over the method name, a nonce and the call parameters.
//! The ledger never takes a caller's word for who it is. The caller is the
//! [`Address`] of the key that verified.
//!
//! ```text
//! message = "taconomics/call/v1" || 0x00 || method || 0x00 || nonce BE || canonical_json(params)
//! ```
//!
//! Canonical JSON sorts object keys at every depth, so clients may send
//! their parameters in any order. Nonces are checked by the host, not here:
//! a nonce must be above the last one the same account has spent.
//!
//! Key bytes are never logged.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::types::Address;

/// Domain tag that keeps call signatures from being valid anywhere else.
const CALL_DOMAIN: &[u8] = b"taconomics/call/v1";

/// Why a signed call was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature encoding: expected 64 hex-encoded bytes")]
    InvalidSignature,

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("invalid secret key: expected 32 hex-encoded bytes")]
    InvalidSecretKey,
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Proof that the holder of `public_key` made a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSignature {
    /// Hex-encoded 32-byte Ed25519 public key.
    pub public_key: String,
    /// Must exceed the last nonce this key's address used.
    pub nonce: u64,
    /// Hex-encoded 64-byte Ed25519 signature.
    pub signature: String,
}

impl CallSignature {
    /// Checks the signature against `method` and `params` and returns the
    /// caller's address.
    ///
    /// Verification is strict: small-order keys and malleable signatures
    /// are rejected.
    pub fn verify(&self, method: &str, params: &Value) -> Result<Address, AuthError> {
        let key_bytes: [u8; 32] = decode_fixed(&self.public_key).ok_or(AuthError::InvalidPublicKey)?;
        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| AuthError::InvalidPublicKey)?;
        let sig_bytes: [u8; 64] = decode_fixed(&self.signature).ok_or(AuthError::InvalidSignature)?;
        let signature = Signature::from_bytes(&sig_bytes);

        verifying_key
            .verify_strict(&signable_bytes(method, params, self.nonce), &signature)
            .map_err(|_| AuthError::VerificationFailed)?;
        Ok(Address::from_public_key(&key_bytes))
    }
}

/// The exact bytes a caller signs.
pub fn signable_bytes(method: &str, params: &Value, nonce: u64) -> Vec<u8> {
    let body = canonical(params).to_string();
    let mut message = Vec::with_capacity(CALL_DOMAIN.len() + method.len() + body.len() + 10);
    message.extend_from_slice(CALL_DOMAIN);
    message.push(0);
    message.extend_from_slice(method.as_bytes());
    message.push(0);
    message.extend_from_slice(&nonce.to_be_bytes());
    message.extend_from_slice(body.as_bytes());
    message
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

fn decode_fixed<const N: usize>(raw: &str) -> Option<[u8; N]> {
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .ok()?
        .try_into()
        .ok()
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// An account's signing key.
///
/// Not `Serialize`: exporting a secret goes through
/// [`secret_hex`](Self::secret_hex) on purpose.
pub struct CallerKey {
    signing_key: SigningKey,
}

impl CallerKey {
    /// A fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key from a 32-byte seed. The seed is the secret.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Loads a key written by [`secret_hex`](Self::secret_hex).
    pub fn from_hex(raw: &str) -> Result<Self, AuthError> {
        let seed: [u8; SECRET_KEY_LENGTH] =
            decode_fixed(raw.trim()).ok_or(AuthError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// Hex-encoded secret. Handle with care.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// The ledger account this key controls.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key_bytes())
    }

    /// Signs a call to `method` with `params` under `nonce`.
    pub fn sign_call(&self, method: &str, params: &Value, nonce: u64) -> CallSignature {
        let signature = self
            .signing_key
            .sign(&signable_bytes(method, params, nonce));
        CallSignature {
            public_key: self.public_key_hex(),
            nonce,
            signature: hex::encode(signature.to_bytes()),
        }
    }
}

impl fmt::Debug for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallerKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
