//! # Core Ledger Types
//!
//! [`Address`] identifies an account, [`Amount`] is a quantity in the
//! smallest unit and [`Timestamp`] is unix seconds as reported by the host
//! clock.
//!
//! `Amount` is a `u128`. JSON and TOML cannot carry integers that wide
//! without losing precision, so every serialized amount goes through
//! [`amount_string`], which writes it as a decimal string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quantity in the smallest unit (18 decimals).
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Error returned when parsing an [`Address`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address contains whitespace: {0:?}")]
    Whitespace(String),
}

/// An account identity on the host ledger.
///
/// The host owns the account model, so an address is an opaque string.
/// Hex-style addresses are lowercased on construction so that `0xAbC` and
/// `0xabc` name the same account.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Creates an address, normalizing hex-style identities to lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError`] if the identity is empty or contains
    /// whitespace.
    pub fn new(raw: impl Into<String>) -> Result<Self, AddressError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(AddressError::Whitespace(raw));
        }
        if raw.starts_with("0x") || raw.starts_with("0X") {
            return Ok(Self(raw.to_lowercase()));
        }
        Ok(Self(raw))
    }

    /// Derives a deterministic contract address from a label.
    ///
    /// `0x` followed by the first 20 bytes of `BLAKE3(label)`, hex encoded.
    /// Two hosts deploying from the same genesis agree on every contract
    /// account without having to exchange anything.
    pub fn derive(label: &str) -> Self {
        let digest = blake3::hash(label.as_bytes());
        Self(format!("0x{}", hex::encode(&digest.as_bytes()[..20])))
    }

    /// Address of an Ed25519 public key: `0x` followed by the first 20
    /// bytes of `BLAKE3(public_key)`, hex encoded.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = blake3::hash(public_key);
        Self(format!("0x{}", hex::encode(&digest.as_bytes()[..20])))
    }

    /// `0x` followed by forty zeroes. Source of minted tokens in the journal.
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(40)))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// Amount encoding
// ---------------------------------------------------------------------------

/// Serde adapter that encodes an [`Amount`] as a decimal string.
///
/// ```ignore
/// #[serde(with = "taconomics_protocol::types::amount_string")]
/// pub amount: Amount,
/// ```
pub mod amount_string {
    use super::Amount;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let digits: String = raw.chars().filter(|c| *c != '_').collect();
        digits
            .parse::<Amount>()
            .map_err(|e| D::Error::custom(format!("invalid amount {raw:?}: {e}")))
    }
}
