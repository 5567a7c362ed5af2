//! End-to-end settlement against the in-memory ledger.
//!
//! Each test drives the full two-phase flow the way a client would:
//! the engine prepares a transaction, the wallet signs and submits it to the
//! ledger, and the engine confirms by signature.

use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use tixgate_ledger::memory::MemoryLedger;
use tixgate_ledger::{Ed25519Verifier, LedgerClient, Transaction};
use tixgate_settlement::*;
use tixgate_types::*;

struct Harness {
    ledger: Arc<MemoryLedger>,
    engine: SettlementEngine,
    organizer: Address,
}

struct Wallet {
    key: SigningKey,
    auth: AuthenticatedUser,
}

impl Wallet {
    fn session(&self) -> &Session {
        &self.auth.session
    }

    fn address(&self) -> &Address {
        &self.auth.session.wallet
    }
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SettlementConfig::immediate())
    }

    fn with_config(config: SettlementConfig) -> Self {
        let ledger = Arc::new(MemoryLedger::new());
        let secrets = EngineSecrets::new(
            KeySalt::new("integration-salt").unwrap(),
            PlatformAuthority::generate(),
        );
        let engine =
            SettlementEngine::new(ledger.clone(), Arc::new(Ed25519Verifier), secrets, config)
                .unwrap();
        Self {
            ledger,
            engine,
            organizer: Address::random(),
        }
    }

    fn event(&self, price: u64, total: u32) -> Event {
        let event = Event::new("Opening night", self.organizer.clone(), price, total);
        self.engine.store().insert_event(event.clone());
        event
    }

    fn wallet(&self, seed: u8, funds: u64) -> Wallet {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let request = SignedRequest {
            wallet: Address::from_verifying_key(&key.verifying_key()).to_string(),
            message: constants::CUSTODIAL_KEY_MESSAGE.to_string(),
            signature: hex::encode(
                key.sign(constants::CUSTODIAL_KEY_MESSAGE.as_bytes())
                    .to_bytes(),
            ),
        };
        let auth = self.engine.authenticate(&request).unwrap();
        self.ledger.airdrop(&auth.session.wallet, funds);
        Wallet { key, auth }
    }

    /// What the wallet does client-side: sign the prepared transaction and
    /// submit it.
    async fn sign_and_submit(&self, wallet: &Wallet, encoded: &str) -> String {
        let mut tx = Transaction::from_base64(encoded).unwrap();
        tx.sign(&wallet.key).unwrap();
        assert!(tx.is_fully_signed());
        self.ledger.submit(&tx).await.unwrap()
    }

    async fn mint(&self, wallet: &Wallet, event: &Event, quantity: u32) -> MintSettlement {
        let prepared = self
            .engine
            .prepare_mint(wallet.session(), event.id, quantity)
            .await
            .unwrap();
        let signature = self.sign_and_submit(wallet, &prepared.transaction).await;
        self.engine
            .confirm_mint(wallet.session(), prepared.order.id, &signature)
            .await
            .unwrap()
    }

    async fn listed_ticket(&self, seller: &Wallet, price: u64) -> ListingView {
        self.engine.initialize_marketplace().await.unwrap();
        let event = self.event(2, 10);
        let minted = self.mint(seller, &event, 1).await;
        self.engine
            .create_listing(&seller.auth, minted.tickets[0].asset.as_str(), price)
            .await
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Primary sales
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mint_two_of_ten_tickets() {
    let h = Harness::new();
    let event = h.event(2, 10);
    let buyer = h.wallet(1, 100);

    let settled = h.mint(&buyer, &event, 2).await;

    assert_eq!(settled.order.status, OrderStatus::Confirmed);
    assert_eq!(settled.order.total_price, 4);
    assert_eq!(settled.tickets.len(), 2);
    let indexes: Vec<u32> = settled.tickets.iter().map(|t| t.display_index).collect();
    assert_eq!(indexes, vec![1, 2]);
    assert_eq!(h.engine.store().event(event.id).unwrap().tickets_available, 8);
    for ticket in &settled.tickets {
        assert_eq!(
            h.ledger.owner_of(&ticket.asset).as_ref(),
            Some(&buyer.session().custodial_address)
        );
    }

    let DistributionOutcome::Distributed(payout) = &settled.distribution else {
        panic!("expected a payout, got {:?}", settled.distribution);
    };
    assert_eq!(payout.split.organizer_share + payout.split.platform_share, 4);
    assert_eq!(h.ledger.balance_of(&h.organizer), payout.split.organizer_share);
    assert_eq!(h.ledger.balance_of(buyer.address()), 96);
}

#[tokio::test]
async fn reconfirming_a_mint_changes_nothing() {
    let h = Harness::new();
    let event = h.event(2, 10);
    let buyer = h.wallet(1, 100);

    let prepared = h
        .engine
        .prepare_mint(buyer.session(), event.id, 2)
        .await
        .unwrap();
    let signature = h.sign_and_submit(&buyer, &prepared.transaction).await;
    let first = h
        .engine
        .confirm_mint(buyer.session(), prepared.order.id, &signature)
        .await
        .unwrap();
    let submissions = h.ledger.submissions().len();

    let second = h
        .engine
        .confirm_mint(buyer.session(), prepared.order.id, &signature)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(h.ledger.submissions().len(), submissions, "no second payout");
    assert_eq!(h.engine.store().event(event.id).unwrap().tickets_available, 8);
}

#[tokio::test]
async fn timed_out_mint_leaves_the_order_pending() {
    let h = Harness::new();
    let event = h.event(2, 10);
    let buyer = h.wallet(1, 100);

    let prepared = h
        .engine
        .prepare_mint(buyer.session(), event.id, 1)
        .await
        .unwrap();
    h.ledger.delay_next_submission(15);
    let signature = h.sign_and_submit(&buyer, &prepared.transaction).await;

    let err = h
        .engine
        .confirm_mint(buyer.session(), prepared.order.id, &signature)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfirmationTimeout);
    assert!(err.is_retryable());
    let order = h.engine.store().order(prepared.order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(h.engine.store().tickets_for_order(order.id).is_empty());

    let settled = h
        .engine
        .confirm_mint(buyer.session(), prepared.order.id, &signature)
        .await
        .unwrap();
    assert_eq!(settled.tickets.len(), 1);
}

#[tokio::test]
async fn rejected_mint_fails_the_order() {
    let h = Harness::new();
    let event = h.event(2, 10);
    let broke = h.wallet(1, 1);

    let prepared = h
        .engine
        .prepare_mint(broke.session(), event.id, 1)
        .await
        .unwrap();
    let signature = h.sign_and_submit(&broke, &prepared.transaction).await;
    let err = h
        .engine
        .confirm_mint(broke.session(), prepared.order.id, &signature)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LedgerSubmissionFailed);
    let order = h.engine.store().order(prepared.order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(h.engine.store().event(event.id).unwrap().tickets_available, 10);
}

#[tokio::test]
async fn another_users_order_cannot_be_confirmed() {
    let h = Harness::new();
    let event = h.event(2, 10);
    let buyer = h.wallet(1, 100);
    let stranger = h.wallet(2, 100);

    let prepared = h
        .engine
        .prepare_mint(buyer.session(), event.id, 1)
        .await
        .unwrap();
    let signature = h.sign_and_submit(&buyer, &prepared.transaction).await;
    let err = h
        .engine
        .confirm_mint(stranger.session(), prepared.order.id, &signature)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::NotOwner { .. }));
}

#[tokio::test]
async fn a_signature_from_another_order_is_refused() {
    let h = Harness::new();
    let cheap = h.event(1, 10);
    let pricey = h.event(1_000, 10);
    let buyer = h.wallet(1, 100);

    let cheap_order = h
        .engine
        .prepare_mint(buyer.session(), cheap.id, 1)
        .await
        .unwrap();
    let pricey_order = h
        .engine
        .prepare_mint(buyer.session(), pricey.id, 1)
        .await
        .unwrap();
    let cheap_signature = h.sign_and_submit(&buyer, &cheap_order.transaction).await;

    let err = h
        .engine
        .confirm_mint(buyer.session(), pricey_order.order.id, &cheap_signature)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::ForeignTransaction { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    let order = h.engine.store().order(pricey_order.order.id).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(h.engine.store().event(pricey.id).unwrap().tickets_available, 10);

    let settled = h
        .engine
        .confirm_mint(buyer.session(), cheap_order.order.id, &cheap_signature)
        .await
        .unwrap();
    assert_eq!(settled.order.status, OrderStatus::Confirmed);
    assert_eq!(settled.tickets.len(), 1);
}

#[tokio::test]
async fn failed_payout_keeps_the_mint_and_can_be_retried() {
    let h = Harness::new();
    let event = h.event(100, 10);
    let buyer = h.wallet(1, 1_000);

    let prepared = h
        .engine
        .prepare_mint(buyer.session(), event.id, 1)
        .await
        .unwrap();
    let signature = h.sign_and_submit(&buyer, &prepared.transaction).await;
    h.ledger.fail_next_submission("treasury frozen");

    let settled = h
        .engine
        .confirm_mint(buyer.session(), prepared.order.id, &signature)
        .await
        .unwrap();
    assert_eq!(settled.order.status, OrderStatus::Confirmed);
    let DistributionOutcome::Deferred(replay) = &settled.distribution else {
        panic!("expected a deferred payout, got {:?}", settled.distribution);
    };
    assert_eq!(replay.attempts, 1);
    assert_eq!(replay.split.organizer_share, 98);
    assert_eq!(h.ledger.balance_of(&h.organizer), 0);

    h.ledger.make_unavailable(1);
    let err = h
        .engine
        .retry_distribution(settled.order.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DistributionFailed);
    assert_eq!(
        h.engine
            .store()
            .distribution_replay(settled.order.id)
            .unwrap()
            .attempts,
        2
    );

    let payout = h.engine.retry_distribution(settled.order.id).await.unwrap();
    assert_eq!(payout.split.organizer_share, 98);
    assert_eq!(h.ledger.balance_of(&h.organizer), 98);
    assert!(h.engine.store().pending_distributions().is_empty());

    let again = h.engine.retry_distribution(settled.order.id).await.unwrap();
    assert_eq!(again, payout);
}

#[tokio::test]
async fn concurrent_first_purchases_share_one_endpoint() {
    let mut config = SettlementConfig::immediate();
    config.confirmation.interval_ms = 1;
    let h = Harness::with_config(config);
    let event = h.event(2, 10);
    let alice = h.wallet(1, 100);
    let bob = h.wallet(2, 100);

    h.ledger.delay_next_submission(3);
    let (a, b) = tokio::join!(
        h.engine.prepare_mint(alice.session(), event.id, 1),
        h.engine.prepare_mint(bob.session(), event.id, 1),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.endpoint, b.endpoint);
    assert_eq!(h.ledger.endpoint_count(), 1);
    assert!(h.engine.store().endpoint(event.id).unwrap().is_ready());
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_above_issuance_price() {
    let h = Harness::new();
    let seller = h.wallet(1, 100);

    let view = h.listed_ticket(&seller, 3).await;
    assert_eq!(view.listing.status, ListingStatus::Active);
    assert_eq!(view.price_comparison, PriceComparison::Higher);
    assert_eq!(view.price_difference, 1);
    assert_eq!(view.listing.original_price, 2);

    let err = h
        .engine
        .create_listing(&seller.auth, view.listing.asset.as_str(), 5)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    assert!(matches!(err, TixgateError::DuplicateActiveListing { .. }));

    assert_eq!(h.engine.listing_view(view.listing.id).unwrap(), view);
}

#[tokio::test]
async fn only_the_owner_can_list() {
    let h = Harness::new();
    h.engine.initialize_marketplace().await.unwrap();
    let event = h.event(2, 10);
    let owner = h.wallet(1, 100);
    let thief = h.wallet(2, 100);
    let minted = h.mint(&owner, &event, 1).await;

    let err = h
        .engine
        .create_listing(&thief.auth, minted.tickets[0].asset.as_str(), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::NotOwner { .. }));
}

#[tokio::test]
async fn malformed_addresses_never_reach_the_ledger() {
    let h = Harness::new();
    h.engine.initialize_marketplace().await.unwrap();
    let seller = h.wallet(1, 100);
    let submissions = h.ledger.submissions().len();

    for bad in ["", "0xabc", "I0Ol", "11111111111111111111111111111111111111111111"] {
        let err = h
            .engine
            .create_listing(&seller.auth, bad, 3)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{bad:?} gave {err:?}");
    }
    let err = h
        .engine
        .resume_listing(seller.session(), "not an address")
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::InvalidAddressEncoding { .. }));
    assert_eq!(h.ledger.submissions().len(), submissions);
}

#[tokio::test]
async fn resale_moves_ticket_and_proceeds() {
    let h = Harness::new();
    let seller = h.wallet(1, 100);
    let buyer = h.wallet(2, 10);
    let view = h.listed_ticket(&seller, 3).await;
    let seller_before = h.ledger.balance_of(&seller.session().custodial_address);

    let prepared = h
        .engine
        .prepare_buy(buyer.session(), view.listing.id)
        .await
        .unwrap();
    assert!(prepared.platform_signed);
    assert_eq!(prepared.price, 3);
    let signature = h.sign_and_submit(&buyer, &prepared.transaction).await;

    let settled = h
        .engine
        .confirm_buy(buyer.session(), view.listing.id, &signature)
        .await
        .unwrap();
    assert_eq!(settled.listing.listing.status, ListingStatus::Sold);
    assert_eq!(settled.listing.listing.buyer, Some(buyer.session().user_id));
    assert_eq!(
        settled.listing.listing.closing_signature.as_deref(),
        Some(signature.as_str())
    );
    assert_eq!(settled.ticket.owner, buyer.session().user_id);
    assert_eq!(
        h.ledger.owner_of(&view.listing.asset).as_ref(),
        Some(&buyer.session().custodial_address)
    );
    assert_eq!(
        h.ledger.balance_of(&seller.session().custodial_address),
        seller_before + 3
    );
    assert_eq!(h.ledger.balance_of(buyer.address()), 7);
}

#[tokio::test]
async fn confirming_a_sold_listing_skips_the_ledger() {
    let h = Harness::new();
    let seller = h.wallet(1, 100);
    let buyer = h.wallet(2, 10);
    let view = h.listed_ticket(&seller, 3).await;

    let prepared = h
        .engine
        .prepare_buy(buyer.session(), view.listing.id)
        .await
        .unwrap();
    let signature = h.sign_and_submit(&buyer, &prepared.transaction).await;
    let first = h
        .engine
        .confirm_buy(buyer.session(), view.listing.id, &signature)
        .await
        .unwrap();
    let polls = h.ledger.polls_for(&signature);

    let second = h
        .engine
        .confirm_buy(buyer.session(), view.listing.id, &signature)
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(h.ledger.polls_for(&signature), polls);
}

#[tokio::test]
async fn concurrent_purchase_confirms_settle_once() {
    let h = Harness::new();
    let seller = h.wallet(1, 100);
    let buyer = h.wallet(2, 10);
    let view = h.listed_ticket(&seller, 3).await;

    let prepared = h
        .engine
        .prepare_buy(buyer.session(), view.listing.id)
        .await
        .unwrap();
    let signature = h.sign_and_submit(&buyer, &prepared.transaction).await;

    let other = h.engine.clone();
    let (a, b) = tokio::join!(
        h.engine
            .confirm_buy(buyer.session(), view.listing.id, &signature),
        other.confirm_buy(buyer.session(), view.listing.id, &signature),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.listing.listing.status, ListingStatus::Sold);
    assert_eq!(a.listing.listing.id, b.listing.listing.id);
    assert_eq!(a.ticket.owner, buyer.session().user_id);
}

#[tokio::test]
async fn seller_cannot_buy_their_own_listing() {
    let h = Harness::new();
    let seller = h.wallet(1, 100);
    let view = h.listed_ticket(&seller, 3).await;

    let err = h
        .engine
        .prepare_buy(seller.session(), view.listing.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::SelfPurchaseRejected));
}

#[tokio::test]
async fn buyer_must_cover_the_price() {
    let h = Harness::new();
    let seller = h.wallet(1, 100);
    let buyer = h.wallet(2, 1);
    let view = h.listed_ticket(&seller, 3).await;

    let err = h
        .engine
        .prepare_buy(buyer.session(), view.listing.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TixgateError::InsufficientFunds {
            needed: 3,
            available: 1
        }
    ));
}

#[tokio::test]
async fn cancelled_listing_is_final() {
    let h = Harness::new();
    let seller = h.wallet(1, 100);
    let buyer = h.wallet(2, 10);
    let view = h.listed_ticket(&seller, 3).await;

    let cancelled = h
        .engine
        .cancel_listing(&seller.auth, view.listing.id)
        .await
        .unwrap();
    assert_eq!(cancelled.listing.status, ListingStatus::Cancelled);

    let err = h
        .engine
        .prepare_buy(buyer.session(), view.listing.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::ListingNotActive { .. }));
    let err = h
        .engine
        .cancel_listing(&seller.auth, view.listing.id)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::ListingNotActive { .. }));

    let relisted = h
        .engine
        .create_listing(&seller.auth, view.listing.asset.as_str(), 1)
        .await
        .unwrap();
    assert_eq!(relisted.price_comparison, PriceComparison::Lower);
    assert_ne!(relisted.listing.id, view.listing.id);
}

#[tokio::test]
async fn timed_out_listing_blocks_duplicates_until_resumed() {
    let mut config = SettlementConfig::immediate();
    config.confirmation.max_attempts = 2;
    let h = Harness::with_config(config);
    h.engine.initialize_marketplace().await.unwrap();
    let event = h.event(2, 10);
    let seller = h.wallet(1, 100);
    let minted = h.mint(&seller, &event, 1).await;
    let asset = minted.tickets[0].asset.as_str();

    h.ledger.delay_next_submission(3);
    let err = h
        .engine
        .create_listing(&seller.auth, asset, 3)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfirmationTimeout);

    let err = h
        .engine
        .create_listing(&seller.auth, asset, 4)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::DuplicateActiveListing { .. }));

    let view = h
        .engine
        .resume_listing(seller.session(), asset)
        .await
        .unwrap();
    assert_eq!(view.listing.status, ListingStatus::Active);
    assert_eq!(view.listing.price, 3);

    let again = h
        .engine
        .resume_listing(seller.session(), asset)
        .await
        .unwrap();
    assert_eq!(again.listing.id, view.listing.id);
}

#[tokio::test]
async fn listing_survives_a_lost_acknowledgement() {
    let h = Harness::new();
    h.engine.initialize_marketplace().await.unwrap();
    let event = h.event(2, 10);
    let seller = h.wallet(1, 100);
    let minted = h.mint(&seller, &event, 1).await;
    let asset = minted.tickets[0].asset.as_str();

    h.ledger.drop_next_ack();
    let view = h
        .engine
        .create_listing(&seller.auth, asset, 3)
        .await
        .unwrap();
    assert_eq!(view.listing.status, ListingStatus::Active);

    let err = h
        .engine
        .create_listing(&seller.auth, asset, 4)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::DuplicateActiveListing { .. }));
}

#[tokio::test]
async fn timed_out_cancellation_is_confirmed_later() {
    let mut config = SettlementConfig::immediate();
    config.confirmation.max_attempts = 2;
    let h = Harness::with_config(config);
    let seller = h.wallet(1, 100);
    let view = h.listed_ticket(&seller, 3).await;

    h.ledger.delay_next_submission(3);
    let err = h
        .engine
        .cancel_listing(&seller.auth, view.listing.id)
        .await
        .unwrap_err();
    let TixgateError::ConfirmationTimeout { signature, .. } = err else {
        panic!("expected a timeout, got {err:?}");
    };
    assert_eq!(
        h.engine.listing_view(view.listing.id).unwrap().listing.status,
        ListingStatus::Active
    );

    let cancelled = h
        .engine
        .confirm_cancel_listing(seller.session(), view.listing.id, &signature)
        .await
        .unwrap();
    assert_eq!(cancelled.listing.status, ListingStatus::Cancelled);

    let again = h
        .engine
        .confirm_cancel_listing(seller.session(), view.listing.id, &signature)
        .await
        .unwrap();
    assert_eq!(again, cancelled);
}

#[tokio::test]
async fn listing_requires_an_initialized_marketplace() {
    let h = Harness::new();
    let event = h.event(2, 10);
    let seller = h.wallet(1, 100);
    let minted = h.mint(&seller, &event, 1).await;

    let err = h
        .engine
        .create_listing(&seller.auth, minted.tickets[0].asset.as_str(), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, TixgateError::MarketplaceNotInitialized));
}
