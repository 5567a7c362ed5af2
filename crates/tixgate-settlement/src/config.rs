//! Engine secrets, loaded once at startup.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `TIXGATE_KEY_SALT` | custodial key derivation salt |
//! | `TIXGATE_PLATFORM_KEY` | hex 32-byte ed25519 seed of the platform key |
//!
//! Both are required. Tuning knobs live in [`SettlementConfig`].
//!
//! [`SettlementConfig`]: tixgate_types::SettlementConfig

use std::fmt;

use ed25519_dalek::SigningKey;
use tixgate_ledger::Transaction;
use tixgate_types::{Address, Result, TixgateError};

use crate::key_derivation::KeySalt;

pub const SALT_VAR: &str = "TIXGATE_KEY_SALT";
pub const PLATFORM_KEY_VAR: &str = "TIXGATE_PLATFORM_KEY";

/// The platform's own signing key. It pays fees for platform-initiated
/// transactions, owns issuance endpoints and the marketplace registry, and
/// is the treasury that receives primary-sale proceeds.
#[derive(Clone)]
pub struct PlatformAuthority {
    key: SigningKey,
    address: Address,
}

impl PlatformAuthority {
    #[must_use]
    pub fn from_signing_key(key: SigningKey) -> Self {
        let address = Address::from_verifying_key(&key.verifying_key());
        Self { key, address }
    }

    /// # Errors
    /// Returns [`TixgateError::Configuration`] unless `seed` is 32 bytes of hex.
    pub fn from_hex_seed(seed: &str) -> Result<Self> {
        let bytes = hex::decode(seed.trim())
            .map_err(|_| TixgateError::Configuration(format!("{PLATFORM_KEY_VAR} is not hex")))?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            TixgateError::Configuration(format!("{PLATFORM_KEY_VAR} must be 32 bytes"))
        })?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&seed)))
    }

    /// A fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// # Errors
    /// Fails if the platform is not a required signer of `transaction`.
    pub fn sign(&self, transaction: &mut Transaction) -> Result<()> {
        transaction.sign(&self.key)
    }
}

impl fmt::Debug for PlatformAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformAuthority")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Secrets the engine needs and nothing else may see.
#[derive(Debug, Clone)]
pub struct EngineSecrets {
    pub salt: KeySalt,
    pub platform: PlatformAuthority,
}

impl EngineSecrets {
    #[must_use]
    pub fn new(salt: KeySalt, platform: PlatformAuthority) -> Self {
        Self { salt, platform }
    }

    /// Load from the process environment. Fails fast on anything missing.
    ///
    /// # Errors
    /// Returns [`TixgateError::Configuration`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let salt = lookup(SALT_VAR)
            .ok_or_else(|| TixgateError::Configuration(format!("{SALT_VAR} is not set")))?;
        let seed = lookup(PLATFORM_KEY_VAR)
            .ok_or_else(|| TixgateError::Configuration(format!("{PLATFORM_KEY_VAR} is not set")))?;
        let secrets = Self::new(KeySalt::new(salt)?, PlatformAuthority::from_hex_seed(&seed)?);
        tracing::info!(platform = %secrets.platform.address(), "Engine secrets loaded");
        Ok(secrets)
    }
}
