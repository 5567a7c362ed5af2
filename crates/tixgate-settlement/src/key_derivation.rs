//! Custodial key derivation.
//!
//! A user's custodial keypair is never stored. It is rebuilt on demand from a
//! fresh wallet signature:
//!
//! ```text
//! seed    = SHA-256( owner_address || lowercase_hex(signature_bytes) || salt )
//! keypair = ed25519_from_seed(seed)
//! ```
//!
//! The salt is a process-wide secret. Neither it nor the derived private key
//! ever leaves this module except through [`CustodialKeypair::sign`].

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use tixgate_ledger::{decode_signature, Transaction};
use tixgate_types::{Address, Result, TixgateError};

/// Process-wide derivation salt. `Debug` is redacted.
#[derive(Clone)]
pub struct KeySalt(String);

impl KeySalt {
    /// # Errors
    /// Returns [`TixgateError::Configuration`] for an empty salt.
    pub fn new(salt: impl Into<String>) -> Result<Self> {
        let salt = salt.into();
        if salt.trim().is_empty() {
            return Err(TixgateError::Configuration(
                "key derivation salt must not be empty".into(),
            ));
        }
        Ok(Self(salt))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for KeySalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeySalt(<redacted>)")
    }
}

/// A derived custodial keypair. `Debug` shows the address only.
#[derive(Clone)]
pub struct CustodialKeypair {
    signing: SigningKey,
    address: Address,
}

impl CustodialKeypair {
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Add this keypair's signature to `transaction`.
    ///
    /// # Errors
    /// Fails if the custodial address is not a required signer.
    pub fn sign(&self, transaction: &mut Transaction) -> Result<()> {
        transaction.sign(&self.signing)
    }
}

impl fmt::Debug for CustodialKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodialKeypair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derive the custodial keypair for `owner` from one of their signatures.
///
/// Deterministic: the same `(signature, owner, salt)` always yields the same
/// keypair, and changing any one input changes the result.
///
/// # Errors
/// Returns [`TixgateError::InvalidSignatureEncoding`] if `signature` is
/// neither hex nor base58.
pub fn derive_custodial_keypair(
    signature: &str,
    owner: &Address,
    salt: &KeySalt,
) -> Result<CustodialKeypair> {
    let signature_bytes = decode_signature(signature)?;

    let mut hasher = Sha256::new();
    hasher.update(owner.as_str().as_bytes());
    hasher.update(hex::encode(&signature_bytes).as_bytes());
    hasher.update(salt.as_bytes());
    let seed: [u8; 32] = hasher.finalize().into();

    let signing = SigningKey::from_bytes(&seed);
    let address = Address::from_verifying_key(&signing.verifying_key());
    Ok(CustodialKeypair { signing, address })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salt(s: &str) -> KeySalt {
        KeySalt::new(s).unwrap()
    }

    #[test]
    fn derivation_is_deterministic() {
        let owner = Address::random();
        let sig = hex::encode([7u8; 64]);
        let a = derive_custodial_keypair(&sig, &owner, &salt("pepper")).unwrap();
        let b = derive_custodial_keypair(&sig, &owner, &salt("pepper")).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn each_input_changes_the_key() {
        let owner = Address::random();
        let sig = hex::encode([7u8; 64]);
        let base = derive_custodial_keypair(&sig, &owner, &salt("pepper")).unwrap();

        let other_sig = hex::encode([8u8; 64]);
        let by_sig = derive_custodial_keypair(&other_sig, &owner, &salt("pepper")).unwrap();
        let by_owner = derive_custodial_keypair(&sig, &Address::random(), &salt("pepper")).unwrap();
        let by_salt = derive_custodial_keypair(&sig, &owner, &salt("paprika")).unwrap();

        assert_ne!(base.address(), by_sig.address());
        assert_ne!(base.address(), by_owner.address());
        assert_ne!(base.address(), by_salt.address());
    }

    #[test]
    fn hex_prefix_and_base58_are_the_same_signature() {
        let owner = Address::random();
        let raw = [0x5au8; 64];
        let plain = derive_custodial_keypair(&hex::encode(raw), &owner, &salt("s")).unwrap();
        let prefixed =
            derive_custodial_keypair(&format!("0x{}", hex::encode(raw)), &owner, &salt("s"))
                .unwrap();
        let base58 =
            derive_custodial_keypair(&bs58::encode(raw).into_string(), &owner, &salt("s")).unwrap();
        assert_eq!(plain.address(), prefixed.address());
        assert_eq!(plain.address(), base58.address());
    }

    #[test]
    fn rejects_undecodable_signature() {
        let err = derive_custodial_keypair("not a signature!", &Address::random(), &salt("s"))
            .unwrap_err();
        assert!(matches!(err, TixgateError::InvalidSignatureEncoding));
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let secret = salt("super-secret-salt");
        assert!(!format!("{secret:?}").contains("super-secret"));

        let keypair =
            derive_custodial_keypair(&hex::encode([1u8; 64]), &Address::random(), &secret).unwrap();
        let debug = format!("{keypair:?}");
        assert!(debug.contains(keypair.address().as_str()));
        assert!(!debug.contains("signing"));
    }

    #[test]
    fn empty_salt_rejected() {
        assert!(matches!(
            KeySalt::new("  "),
            Err(TixgateError::Configuration(_))
        ));
    }
}
