//! Transaction wire model.
//!
//! A [`Transaction`] is a fee payer, a random nonce, and an ordered list of
//! [`Instruction`]s. Every required signer signs the same canonical message:
//!
//! ```text
//! "tixgate:tx:v1:" || json(fee_payer, nonce, instructions)
//! ```
//!
//! Transactions can be partially signed (the platform co-signs, the buyer
//! signs client-side afterwards) and travel between the two as base64 JSON.
//! The transaction's signature, which identifies it on the ledger, is the fee
//! payer's signature in base58.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use tixgate_types::{Address, PendingSubmission, Result, TixgateError};

const MESSAGE_DOMAIN: &[u8] = b"tixgate:tx:v1:";

/// One ledger instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    /// Create an event's issuance endpoint with a fixed supply.
    CreateEndpoint {
        endpoint: Address,
        authority: Address,
        /// Receives primary-sale proceeds.
        treasury: Address,
        supply: u32,
        price: u64,
    },
    /// Mint `quantity` ticket assets to `recipient`, paid by `payer`.
    Mint {
        endpoint: Address,
        payer: Address,
        recipient: Address,
        quantity: u32,
    },
    /// Create the marketplace registry.
    CreateRegistry {
        registry: Address,
        authority: Address,
        requires_authority: bool,
    },
    /// Offer `asset` for resale.
    ListAsset {
        registry: Address,
        listing: Address,
        seller: Address,
        asset: Address,
        price: u64,
    },
    /// Buy a listed asset. `authority` is set when the registry requires its
    /// co-signature.
    BuyListing {
        registry: Address,
        listing: Address,
        buyer: Address,
        recipient: Address,
        seller: Address,
        asset: Address,
        price: u64,
        authority: Option<Address>,
    },
    CancelListing {
        registry: Address,
        listing: Address,
        seller: Address,
        asset: Address,
    },
    /// Native currency transfer.
    Transfer {
        from: Address,
        to: Address,
        amount: u64,
    },
}

impl Instruction {
    /// Accounts that must sign a transaction carrying this instruction.
    #[must_use]
    pub fn signers(&self) -> Vec<&Address> {
        match self {
            Self::CreateEndpoint {
                endpoint,
                authority,
                ..
            } => vec![authority, endpoint],
            Self::Mint { payer, .. } => vec![payer],
            Self::CreateRegistry {
                registry,
                authority,
                ..
            } => vec![authority, registry],
            Self::ListAsset {
                listing, seller, ..
            } => vec![seller, listing],
            Self::BuyListing {
                buyer, authority, ..
            } => {
                let mut signers = vec![buyer];
                if let Some(authority) = authority {
                    signers.push(authority);
                }
                signers
            }
            Self::CancelListing { seller, .. } => vec![seller],
            Self::Transfer { from, .. } => vec![from],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub fee_payer: Address,
    /// Random per transaction so identical instructions get distinct signatures.
    pub nonce: String,
    pub instructions: Vec<Instruction>,
    /// Signer address → base58 ed25519 signature.
    pub signatures: BTreeMap<Address, String>,
}

impl Transaction {
    #[must_use]
    pub fn new(fee_payer: Address, instructions: Vec<Instruction>) -> Self {
        Self {
            fee_payer,
            nonce: hex::encode(rand::random::<[u8; 16]>()),
            instructions,
            signatures: BTreeMap::new(),
        }
    }

    /// Canonical bytes every signer signs.
    pub fn message(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(&(&self.fee_payer, &self.nonce, &self.instructions))?;
        let mut message = Vec::with_capacity(MESSAGE_DOMAIN.len() + body.len());
        message.extend_from_slice(MESSAGE_DOMAIN);
        message.extend_from_slice(&body);
        Ok(message)
    }

    /// Fee payer first, then instruction signers in order, deduplicated.
    #[must_use]
    pub fn required_signers(&self) -> Vec<Address> {
        let mut signers = vec![self.fee_payer.clone()];
        for signer in self.instructions.iter().flat_map(Instruction::signers) {
            if !signers.contains(signer) {
                signers.push(signer.clone());
            }
        }
        signers
    }

    #[must_use]
    pub fn requires_signer(&self, address: &Address) -> bool {
        self.required_signers().contains(address)
    }

    /// Add `key`'s signature. The key must belong to a required signer.
    pub fn sign(&mut self, key: &SigningKey) -> Result<()> {
        let signer = Address::from_verifying_key(&key.verifying_key());
        if !self.requires_signer(&signer) {
            return Err(TixgateError::Internal(format!(
                "{signer} is not a required signer"
            )));
        }
        let signature = key.sign(&self.message()?);
        self.signatures
            .insert(signer, bs58::encode(signature.to_bytes()).into_string());
        Ok(())
    }

    #[must_use]
    pub fn missing_signers(&self) -> Vec<Address> {
        self.required_signers()
            .into_iter()
            .filter(|signer| !self.signatures.contains_key(signer))
            .collect()
    }

    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        self.missing_signers().is_empty()
    }

    /// Check that every required signature is present and valid.
    pub fn verify_signatures(&self) -> Result<()> {
        let message = self.message()?;
        for signer in self.required_signers() {
            let encoded = self
                .signatures
                .get(&signer)
                .ok_or_else(|| TixgateError::MissingSignature {
                    signer: signer.clone(),
                })?;
            let signature = parse_signature(encoded).ok_or(TixgateError::InvalidSignatureEncoding)?;
            signer
                .verifying_key()?
                .verify(&message, &signature)
                .map_err(|_| TixgateError::MissingSignature {
                    signer: signer.clone(),
                })?;
        }
        Ok(())
    }

    /// The ledger identifier: the fee payer's signature, once present.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signatures.get(&self.fee_payer).map(String::as_str)
    }

    /// Whether `signature` is the fee payer's valid signature over this
    /// transaction, that is, whether it names this transaction on the ledger.
    #[must_use]
    pub fn is_identified_by(&self, signature: &str) -> bool {
        let (Ok(message), Some(signature)) = (self.message(), parse_signature(signature)) else {
            return false;
        };
        self.fee_payer
            .verifying_key()
            .is_ok_and(|key| key.verify(&message, &signature).is_ok())
    }

    /// Record this fully signed transaction before it is sent.
    ///
    /// # Errors
    /// [`TixgateError::MissingSignature`] naming the first absent signer.
    pub fn to_pending(&self) -> Result<PendingSubmission> {
        if let Some(signer) = self.missing_signers().into_iter().next() {
            return Err(TixgateError::MissingSignature { signer });
        }
        let signature = self
            .signature()
            .ok_or_else(|| TixgateError::MissingSignature {
                signer: self.fee_payer.clone(),
            })?
            .to_string();
        Ok(PendingSubmission {
            signature,
            transaction: self.to_base64()?,
        })
    }

    /// Serialize for the client-side signing step. Missing signatures are fine.
    pub fn to_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TixgateError::MalformedTransaction {
                reason: e.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| TixgateError::MalformedTransaction {
            reason: e.to_string(),
        })
    }
}

fn parse_signature(encoded: &str) -> Option<Signature> {
    let bytes: [u8; 64] = bs58::decode(encoded).into_vec().ok()?.try_into().ok()?;
    Some(Signature::from_bytes(&bytes))
}
