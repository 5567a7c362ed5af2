//! Ledger addresses.
//!
//! Addresses are opaque base58 strings encoding a 32-byte ed25519 public key.
//! They are validated structurally before any ledger call so malformed input
//! fails cheaply and never reaches the network.

use std::fmt;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::{Result, TixgateError};

/// Decoded length of every ledger address.
pub const ADDRESS_LEN: usize = 32;

/// A structurally valid ledger address (base58, 32 bytes decoded).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    encoded: String,
    bytes: [u8; ADDRESS_LEN],
}

impl Address {
    /// Parse an address, naming the offending `field` on failure.
    ///
    /// # Errors
    /// Returns [`TixgateError::InvalidAddressEncoding`] if `value` is not
    /// base58 or does not decode to exactly 32 bytes.
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let invalid = || TixgateError::InvalidAddressEncoding {
            field: field.to_string(),
            value: value.to_string(),
        };
        let decoded = bs58::decode(trimmed).into_vec().map_err(|_| invalid())?;
        let bytes: [u8; ADDRESS_LEN] = decoded.try_into().map_err(|_| invalid())?;
        Ok(Self {
            encoded: trimmed.to_string(),
            bytes,
        })
    }

    /// Address of an ed25519 public key.
    #[must_use]
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self::from_bytes(key.as_bytes())
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8; ADDRESS_LEN]) -> Self {
        Self {
            encoded: bs58::encode(bytes).into_string(),
            bytes: *bytes,
        }
    }

    /// Raw 32 bytes behind the address.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.bytes
    }

    /// Interpret the address as an ed25519 verifying key.
    ///
    /// # Errors
    /// Returns [`TixgateError::InvalidAddressEncoding`] if the bytes are not a
    /// valid curve point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.bytes).map_err(|_| {
            TixgateError::InvalidAddressEncoding {
                field: "public_key".to_string(),
                value: self.encoded.clone(),
            }
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl TryFrom<String> for Address {
    type Error = TixgateError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse("address", &value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.encoded
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    /// A random, valid address.
    #[must_use]
    pub fn random() -> Self {
        Self::from_bytes(&rand::random::<[u8; ADDRESS_LEN]>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_address() {
        let addr = Address::from_bytes(&[7u8; 32]);
        let parsed = Address::parse("buyer", addr.as_str()).unwrap();
        assert_eq!(parsed, addr);
        assert_eq!(parsed.as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn rejects_non_base58() {
        let err = Address::parse("buyer", "0OIl-not-base58").unwrap_err();
        assert!(
            matches!(err, TixgateError::InvalidAddressEncoding { ref field, .. } if field == "buyer"),
            "got {err:?}"
        );
    }

    #[test]
    fn rejects_wrong_length() {
        let short = bs58::encode([1u8; 20]).into_string();
        assert!(Address::parse("asset", &short).is_err());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let addr = Address::random();
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
        assert!(serde_json::from_str::<Address>("\"abc\"").is_err());
    }
}
