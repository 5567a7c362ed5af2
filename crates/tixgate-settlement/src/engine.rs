//! The settlement engine: two-phase operations over the ledger and the local
//! store.
//!
//! Every ledger-affecting operation is split in two. `prepare_*` validates
//! and hands back a transaction to sign; `confirm_*` takes the resulting
//! signature, waits for the ledger, and only then mutates local state. A
//! confirmation that times out leaves local state untouched and can be
//! retried with the same signature.
//!
//! Primary sales live in [`crate::primary`], the resale marketplace in
//! [`crate::marketplace`].

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tixgate_ledger::{
    decode_signature, Confirmation, ConfirmationTracker, Instruction, LedgerClient,
    SignatureVerifier, Transaction,
};
use tixgate_types::{
    constants, Address, Listing, ListingId, PriceComparison, Result, SettlementConfig,
    TixgateError,
};

use crate::builder::TransactionBuilder;
use crate::config::{EngineSecrets, PlatformAuthority};
use crate::key_derivation::{derive_custodial_keypair, CustodialKeypair};
use crate::revenue::RevenueSplitter;
use crate::session::{Session, SessionCache, SessionId};
use crate::store::{RegistryCreation, SettlementLedger};

/// A wallet-signed request.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedRequest {
    pub wallet: String,
    pub message: String,
    /// Hex (optionally `0x`-prefixed) or base58.
    pub signature: String,
}

/// Result of [`SettlementEngine::authenticate`].
///
/// Carries the custodial keypair rebuilt from this request's signature. It
/// lives as long as the request that needs it and is never cached.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub session_id: SessionId,
    pub session: Session,
    pub(crate) keypair: CustodialKeypair,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn custodial_address(&self) -> &Address {
        self.keypair.address()
    }
}

/// A listing with its price compared to the issuance price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingView {
    pub listing: Listing,
    pub price_comparison: PriceComparison,
    pub price_difference: i128,
    pub price_change_pct: Option<Decimal>,
}

impl From<Listing> for ListingView {
    fn from(listing: Listing) -> Self {
        Self {
            price_comparison: listing.price_comparison(),
            price_difference: listing.price_difference(),
            price_change_pct: listing.price_change_pct(),
            listing,
        }
    }
}

/// The settlement engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SettlementEngine {
    pub(crate) ledger: Arc<dyn LedgerClient>,
    pub(crate) verifier: Arc<dyn SignatureVerifier>,
    pub(crate) store: Arc<SettlementLedger>,
    pub(crate) secrets: EngineSecrets,
    pub(crate) config: SettlementConfig,
    pub(crate) tracker: ConfirmationTracker,
    pub(crate) builder: TransactionBuilder,
    pub(crate) splitter: RevenueSplitter,
    pub(crate) sessions: SessionCache,
}

impl SettlementEngine {
    /// # Errors
    /// Returns [`TixgateError::Configuration`] for an invalid `config`.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        verifier: Arc<dyn SignatureVerifier>,
        secrets: EngineSecrets,
        config: SettlementConfig,
    ) -> Result<Self> {
        Self::with_store(ledger, verifier, secrets, config, Arc::new(SettlementLedger::new()))
    }

    pub fn with_store(
        ledger: Arc<dyn LedgerClient>,
        verifier: Arc<dyn SignatureVerifier>,
        secrets: EngineSecrets,
        config: SettlementConfig,
        store: Arc<SettlementLedger>,
    ) -> Result<Self> {
        config.validate()?;
        let tracker = ConfirmationTracker::new(ledger.clone(), config.confirmation);
        let builder = TransactionBuilder::new(
            ledger.clone(),
            store.clone(),
            tracker.clone(),
            secrets.platform.clone(),
            config.clone(),
        );
        let splitter = RevenueSplitter::new(
            tracker.clone(),
            secrets.platform.clone(),
            config.platform_fee_bps,
        );
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            platform = %secrets.platform.address(),
            fee_bps = config.platform_fee_bps,
            "Settlement engine ready"
        );
        Ok(Self {
            ledger,
            verifier,
            store,
            secrets,
            tracker,
            builder,
            splitter,
            sessions: SessionCache::new(config.session_ttl_secs),
            config,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SettlementLedger> {
        &self.store
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    #[must_use]
    pub fn platform_address(&self) -> &Address {
        self.secrets.platform.address()
    }

    pub(crate) fn platform(&self) -> &PlatformAuthority {
        &self.secrets.platform
    }

    /// Verify a wallet signature, rebuild the caller's custodial keypair, and
    /// open a session.
    ///
    /// The request must sign [`constants::CUSTODIAL_KEY_MESSAGE`].
    ///
    /// # Errors
    /// Validation errors for a malformed wallet or signature, and
    /// [`TixgateError::SignatureRejected`] if the signature does not verify
    /// or covers another message.
    pub fn authenticate(&self, request: &SignedRequest) -> Result<AuthenticatedUser> {
        let wallet = Address::parse("wallet", &request.wallet)?;
        let signature = decode_signature(&request.signature)?;
        if request.message != constants::CUSTODIAL_KEY_MESSAGE
            || !self
                .verifier
                .verify(request.message.as_bytes(), &signature, &wallet)
        {
            tracing::warn!(wallet = %wallet, "Wallet signature rejected");
            return Err(TixgateError::SignatureRejected { address: wallet });
        }

        let keypair = derive_custodial_keypair(&request.signature, &wallet, &self.secrets.salt)?;
        let user = self.store.ensure_user(&wallet);
        self.store.set_custodial_hint(user.id, keypair.address());
        let session_id = self
            .sessions
            .insert(user.id, wallet.clone(), keypair.address().clone());
        let session = self.sessions.get(session_id).ok_or(TixgateError::SessionExpired)?;

        tracing::info!(user = %user.id, wallet = %wallet, custodial = %keypair.address(), "User authenticated");
        Ok(AuthenticatedUser {
            session_id,
            session,
            keypair,
        })
    }

    /// The live session for `id`.
    ///
    /// # Errors
    /// [`TixgateError::SessionExpired`].
    pub fn session(&self, id: SessionId) -> Result<Session> {
        self.sessions.get(id).ok_or(TixgateError::SessionExpired)
    }

    /// Create the marketplace registry once. Returns the existing registry
    /// if it was already initialized.
    ///
    /// The signed creation is recorded before it is sent. A call after a
    /// timeout or a lost acknowledgement re-sends that recorded creation
    /// instead of building a second registry.
    pub async fn initialize_marketplace(&self) -> Result<Address> {
        if let Some(existing) = self.registry_if_initialized()? {
            return Ok(existing);
        }

        let creation = match self.store.registry_creation() {
            Some(creation) => creation,
            None => self.store.begin_registry_creation(self.sign_registry_creation()?),
        };
        let RegistryCreation {
            registry,
            submission,
        } = creation;
        let outcome = match self.tracker.submit_and_track(&submission).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.store.clear_registry_creation(&registry);
                return Err(err);
            }
        };
        if let Err(err) = outcome.clone().into_result(&submission.signature) {
            if matches!(outcome, Confirmation::Failed { .. }) {
                self.store.clear_registry_creation(&registry);
            }
            return Err(err);
        }

        let recorded = self
            .store
            .set_platform_config(constants::MARKETPLACE_REGISTRY_KEY, registry.as_str());
        self.store.clear_registry_creation(&registry);
        match recorded {
            Ok(()) => {
                tracing::info!(registry = %registry, signature = %submission.signature, "Marketplace registry initialized");
                Ok(registry)
            }
            Err(TixgateError::PlatformConfigConflict { .. }) => {
                tracing::warn!(orphan = %registry, "Registry initialized concurrently, keeping the first");
                self.registry()
            }
            Err(err) => Err(err),
        }
    }

    fn sign_registry_creation(&self) -> Result<RegistryCreation> {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        let registry = Address::from_verifying_key(&key.verifying_key());
        let platform = self.platform();
        let mut tx = Transaction::new(
            platform.address().clone(),
            vec![Instruction::CreateRegistry {
                registry: registry.clone(),
                authority: platform.address().clone(),
                requires_authority: self.config.registry_requires_authority,
            }],
        );
        platform.sign(&mut tx)?;
        tx.sign(&key)?;
        Ok(RegistryCreation {
            registry,
            submission: tx.to_pending()?,
        })
    }

    fn registry_if_initialized(&self) -> Result<Option<Address>> {
        self.store
            .platform_config(constants::MARKETPLACE_REGISTRY_KEY)
            .map(|raw| Address::parse(constants::MARKETPLACE_REGISTRY_KEY, &raw))
            .transpose()
    }

    /// The marketplace registry.
    ///
    /// # Errors
    /// [`TixgateError::MarketplaceNotInitialized`].
    pub fn registry(&self) -> Result<Address> {
        self.registry_if_initialized()?
            .ok_or(TixgateError::MarketplaceNotInitialized)
    }

    /// A listing with its price comparison.
    pub fn listing_view(&self, id: ListingId) -> Result<ListingView> {
        self.store.listing(id).map(ListingView::from)
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::Signer;
    use tixgate_ledger::memory::MemoryLedger;
    use tixgate_ledger::Ed25519Verifier;

    use super::*;
    use crate::key_derivation::KeySalt;

    fn engine() -> SettlementEngine {
        engine_on(Arc::new(MemoryLedger::new()))
    }

    fn signed(wallet: &SigningKey, message: &str) -> SignedRequest {
        SignedRequest {
            wallet: Address::from_verifying_key(&wallet.verifying_key()).to_string(),
            message: message.into(),
            signature: hex::encode(wallet.sign(message.as_bytes()).to_bytes()),
        }
    }

    #[test]
    fn authenticate_opens_a_session_and_derives_the_custodial_address() {
        let engine = engine();
        let wallet = SigningKey::from_bytes(&[3u8; 32]);
        let request = signed(&wallet, constants::CUSTODIAL_KEY_MESSAGE);

        let auth = engine.authenticate(&request).unwrap();
        let session = engine.session(auth.session_id).unwrap();
        assert_eq!(session.custodial_address, *auth.custodial_address());
        assert_ne!(session.custodial_address, session.wallet);

        let again = engine.authenticate(&request).unwrap();
        assert_eq!(again.session.user_id, auth.session.user_id);
        assert_eq!(again.custodial_address(), auth.custodial_address());
    }

    #[test]
    fn forged_signature_is_rejected() {
        let engine = engine();
        let wallet = SigningKey::from_bytes(&[3u8; 32]);
        let mut request = signed(&wallet, constants::CUSTODIAL_KEY_MESSAGE);
        request.signature = hex::encode(wallet.sign(b"something else").to_bytes());
        let err = engine.authenticate(&request).unwrap_err();
        assert!(matches!(err, TixgateError::SignatureRejected { .. }));

        let other_message = signed(&wallet, "sign in");
        let err = engine.authenticate(&other_message).unwrap_err();
        assert!(matches!(err, TixgateError::SignatureRejected { .. }));
        assert!(engine.sessions().is_empty());
    }

    #[test]
    fn malformed_wallet_is_a_validation_error() {
        let engine = engine();
        let request = SignedRequest {
            wallet: "0xdeadbeef".into(),
            message: "m".into(),
            signature: hex::encode([0u8; 64]),
        };
        let err = engine.authenticate(&request).unwrap_err();
        assert_eq!(err.kind(), tixgate_types::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn marketplace_initializes_once() {
        let engine = engine();
        assert!(matches!(
            engine.registry(),
            Err(TixgateError::MarketplaceNotInitialized)
        ));
        let first = engine.initialize_marketplace().await.unwrap();
        let second = engine.initialize_marketplace().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.registry().unwrap(), first);
        assert!(engine.store.registry_creation().is_none());
    }

    fn engine_on(ledger: Arc<MemoryLedger>) -> SettlementEngine {
        SettlementEngine::new(
            ledger,
            Arc::new(Ed25519Verifier),
            EngineSecrets::new(KeySalt::new("pepper").unwrap(), PlatformAuthority::generate()),
            SettlementConfig::immediate(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn lost_registry_acknowledgement_still_initializes() {
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_on(ledger.clone());

        ledger.drop_next_ack();
        let registry = engine.initialize_marketplace().await.unwrap();
        assert_eq!(engine.registry().unwrap(), registry);
        assert_eq!(ledger.submissions().len(), 1, "one registry created");
    }

    #[tokio::test]
    async fn timed_out_registry_is_resent_not_rebuilt() {
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_on(ledger.clone());

        ledger.drop_next_ack();
        ledger.delay_next_submission(12);
        let err = engine.initialize_marketplace().await.unwrap_err();
        assert!(matches!(err, TixgateError::ConfirmationTimeout { .. }));
        let pending = engine.store.registry_creation().unwrap();

        let registry = engine.initialize_marketplace().await.unwrap();
        assert_eq!(registry, pending.registry);
        let mut sent = ledger.submissions();
        sent.dedup();
        assert_eq!(sent, vec![pending.submission.signature]);
    }

    #[tokio::test]
    async fn rejected_registry_creation_is_forgotten() {
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_on(ledger.clone());

        ledger.fail_next_submission("rent not paid");
        let err = engine.initialize_marketplace().await.unwrap_err();
        assert!(matches!(err, TixgateError::LedgerSubmissionFailed { .. }));
        assert!(engine.store.registry_creation().is_none());

        engine.initialize_marketplace().await.unwrap();
    }
}
