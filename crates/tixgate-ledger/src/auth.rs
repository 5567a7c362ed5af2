//! Wallet signature verification.
//!
//! Write requests carry `(message, signature, wallet)`. The signature is
//! checked with the wallet address's native scheme (ed25519 here) before any
//! settlement action runs.

use ed25519_dalek::{Signature, Verifier};
use tixgate_types::{Address, Result, TixgateError};

/// Collaborator that authenticates wallet-signed messages.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, message: &[u8], signature: &[u8], address: &Address) -> bool;
}

/// Verifies ed25519 signatures against base58 public-key addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, message: &[u8], signature: &[u8], address: &Address) -> bool {
        let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        let Ok(key) = address.verifying_key() else {
            return false;
        };
        key.verify(message, &Signature::from_bytes(&bytes)).is_ok()
    }
}

/// Normalize a wallet signature to raw bytes.
///
/// Accepts hex (with or without a `0x` prefix) or base58. Hex is tried first
/// when the string is made of an even number of hex digits.
///
/// # Errors
/// Returns [`TixgateError::InvalidSignatureEncoding`] for empty input or
/// input that is neither encoding.
pub fn decode_signature(encoded: &str) -> Result<Vec<u8>> {
    let trimmed = encoded.trim();
    let unprefixed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"));

    if let Some(hex_body) = unprefixed {
        return hex::decode(hex_body)
            .ok()
            .filter(|b| !b.is_empty())
            .ok_or(TixgateError::InvalidSignatureEncoding);
    }
    if trimmed.is_empty() {
        return Err(TixgateError::InvalidSignatureEncoding);
    }
    if trimmed.len() % 2 == 0 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Ok(bytes) = hex::decode(trimmed) {
            return Ok(bytes);
        }
    }
    bs58::decode(trimmed)
        .into_vec()
        .map_err(|_| TixgateError::InvalidSignatureEncoding)
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;

    #[test]
    fn verifies_wallet_signature() {
        let key = SigningKey::from_bytes(&[4u8; 32]);
        let wallet = Address::from_verifying_key(&key.verifying_key());
        let sig = key.sign(b"login:nonce-1");

        let verifier = Ed25519Verifier;
        assert!(verifier.verify(b"login:nonce-1", &sig.to_bytes(), &wallet));
        assert!(!verifier.verify(b"login:nonce-2", &sig.to_bytes(), &wallet));
        assert!(!verifier.verify(b"login:nonce-1", &sig.to_bytes(), &Address::random()));
        assert!(!verifier.verify(b"login:nonce-1", &[0u8; 10], &wallet));
    }

    #[test]
    fn decodes_all_accepted_encodings() {
        let raw = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(decode_signature("deadbeef").unwrap(), raw);
        assert_eq!(decode_signature("0xdeadbeef").unwrap(), raw);
        assert_eq!(decode_signature("0XDEADBEEF").unwrap(), raw);
        let b58 = bs58::encode(&raw).into_string();
        assert_eq!(decode_signature(&b58).unwrap(), raw);
    }

    #[test]
    fn rejects_undecodable_signatures() {
        for bad in ["", "   ", "0x", "0xzz", "not-base58-0OIl"] {
            assert!(
                matches!(decode_signature(bad), Err(TixgateError::InvalidSignatureEncoding)),
                "{bad:?} should be rejected"
            );
        }
    }
}
