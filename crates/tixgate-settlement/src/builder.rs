//! Builds the unsigned (or partially signed) transactions users sign
//! client-side.
//!
//! - [`TransactionBuilder::prepare_mint`]: lazily creates the event's
//!   issuance endpoint, opens a pending order, and returns the mint
//!   transaction for the buyer's wallet to sign and pay.
//! - [`TransactionBuilder::prepare_marketplace_purchase`]: checks the
//!   on-ledger listing and the buyer's balance, then returns the purchase
//!   transaction, co-signed by the platform when the registry requires it.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use serde::Serialize;
use tixgate_ledger::{Confirmation, ConfirmationTracker, Instruction, LedgerClient, Transaction};
use tixgate_types::{
    constants, Address, EndpointState, Event, EventId, Order, PendingSubmission, Result,
    SettlementConfig, TixgateError,
};

use crate::config::PlatformAuthority;
use crate::session::Session;
use crate::store::{EndpointClaim, SettlementLedger};

/// Output of [`TransactionBuilder::prepare_mint`].
#[derive(Debug, Clone, Serialize)]
pub struct PreparedMint {
    pub order: Order,
    /// Base64 transaction for the buyer's wallet to sign and submit.
    pub transaction: String,
    pub endpoint: Address,
}

/// Raw addresses of a marketplace purchase, validated before any ledger call.
#[derive(Debug, Clone, Copy)]
pub struct PurchaseRequest<'a> {
    pub buyer_wallet: &'a str,
    pub buyer_recipient: &'a str,
    pub listing: &'a str,
    pub registry: &'a str,
    pub asset: &'a str,
}

/// Output of [`TransactionBuilder::prepare_marketplace_purchase`].
#[derive(Debug, Clone, Serialize)]
pub struct PreparedPurchase {
    pub transaction: String,
    pub listing: Address,
    pub seller: Address,
    pub price: u64,
    /// Whether the platform already added its signature.
    pub platform_signed: bool,
}

#[derive(Clone)]
pub struct TransactionBuilder {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<SettlementLedger>,
    tracker: ConfirmationTracker,
    platform: PlatformAuthority,
    config: SettlementConfig,
}

impl TransactionBuilder {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<SettlementLedger>,
        tracker: ConfirmationTracker,
        platform: PlatformAuthority,
        config: SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            store,
            tracker,
            platform,
            config,
        }
    }

    /// Prepare a primary purchase of `quantity` tickets of `event_id`.
    ///
    /// The order is stored `Pending` only once the transaction is built.
    pub async fn prepare_mint(
        &self,
        event_id: EventId,
        buyer: &Session,
        quantity: u32,
    ) -> Result<PreparedMint> {
        if quantity == 0 || quantity > constants::MAX_TICKETS_PER_ORDER {
            return Err(TixgateError::InvalidAmount {
                reason: format!(
                    "quantity must be 1..={}, got {quantity}",
                    constants::MAX_TICKETS_PER_ORDER
                ),
            });
        }
        let event = self.store.event(event_id)?;
        if event.tickets_available < quantity {
            return Err(TixgateError::SoldOut {
                requested: quantity,
                available: event.tickets_available,
            });
        }

        let endpoint = self.ensure_endpoint(&event).await?;
        let mut order = Order::pending(
            buyer.user_id,
            event.id,
            quantity,
            event.ticket_price,
            buyer.custodial_address.clone(),
        )?;
        let tx = Transaction::new(
            buyer.wallet.clone(),
            vec![Instruction::Mint {
                endpoint: endpoint.clone(),
                payer: buyer.wallet.clone(),
                recipient: buyer.custodial_address.clone(),
                quantity,
            }],
        );
        let transaction = tx.to_base64()?;
        order.prepared_transaction = Some(transaction.clone());
        self.store.insert_order(order.clone());

        tracing::info!(
            order = %order.id,
            event = %event.id,
            quantity,
            total_price = order.total_price,
            endpoint = %endpoint,
            "Mint prepared"
        );
        Ok(PreparedMint {
            order,
            transaction,
            endpoint,
        })
    }

    /// The event's issuance endpoint, created on first use.
    ///
    /// Concurrent callers converge on one endpoint: the marker row is
    /// claimed before anything is sent, losers wait for the winner, and an
    /// in-flight creation is re-sent from its recorded bytes rather than
    /// rebuilt. A claim that never recorded a creation is taken over once
    /// it is older than the configured staleness bound.
    pub async fn ensure_endpoint(&self, event: &Event) -> Result<Address> {
        let mut waits = 0;
        loop {
            let key = SigningKey::generate(&mut rand::rngs::OsRng);
            let candidate = Address::from_verifying_key(&key.verifying_key());

            match self.store.claim_endpoint(event.id, &candidate) {
                EndpointClaim::Claimed => {
                    return self.create_endpoint(event, &key, &candidate).await;
                }
                EndpointClaim::Existing(EndpointState::Ready { address, .. }) => {
                    return Ok(address);
                }
                EndpointClaim::Existing(EndpointState::Pending {
                    address,
                    creation: Some(creation),
                    ..
                }) => {
                    if let Some(address) = self.recheck_endpoint(event, &address, &creation).await? {
                        return Ok(address);
                    }
                }
                EndpointClaim::Existing(EndpointState::Pending {
                    address,
                    creation: None,
                    ..
                }) => {
                    let cutoff = chrono::Utc::now() - self.config.endpoint_stale_after();
                    if self.store.reclaim_endpoint(event.id, &address, &candidate, cutoff) {
                        return self.create_endpoint(event, &key, &candidate).await;
                    }
                    if waits >= self.config.endpoint_wait_attempts {
                        return Err(TixgateError::EndpointCreationInProgress(event.id));
                    }
                    waits += 1;
                    tracing::debug!(event = %event.id, waits, "Waiting for concurrent endpoint creation");
                    tokio::time::sleep(self.config.endpoint_wait()).await;
                }
            }
        }
    }

    /// Re-send a recorded creation and settle it. `None` once the claim was
    /// released and may be tried again.
    async fn recheck_endpoint(
        &self,
        event: &Event,
        endpoint: &Address,
        creation: &PendingSubmission,
    ) -> Result<Option<Address>> {
        let outcome = match self.tracker.submit_and_track(creation).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(event = %event.id, signature = %creation.signature, error = %err, "Recorded endpoint creation rejected, reclaiming");
                self.store.release_endpoint(event.id, endpoint);
                return Ok(None);
            }
        };
        match outcome {
            Confirmation::Confirmed { .. } => {
                self.store.complete_endpoint(event.id, &creation.signature).map(Some)
            }
            Confirmation::Failed { reason, .. } => {
                tracing::warn!(event = %event.id, signature = %creation.signature, reason = %reason, "Endpoint creation failed, reclaiming");
                self.store.release_endpoint(event.id, endpoint);
                Ok(None)
            }
            Confirmation::TimedOut { attempts } => Err(TixgateError::ConfirmationTimeout {
                signature: creation.signature.clone(),
                attempts,
            }),
        }
    }

    async fn create_endpoint(&self, event: &Event, key: &SigningKey, endpoint: &Address) -> Result<Address> {
        let mut tx = Transaction::new(
            self.platform.address().clone(),
            vec![Instruction::CreateEndpoint {
                endpoint: endpoint.clone(),
                authority: self.platform.address().clone(),
                treasury: self.platform.address().clone(),
                supply: event.total_tickets,
                price: event.ticket_price,
            }],
        );
        let signed = self
            .platform
            .sign(&mut tx)
            .and_then(|()| tx.sign(key))
            .and_then(|()| tx.to_pending());
        let creation = match signed {
            Ok(creation) => creation,
            Err(err) => {
                self.store.release_endpoint(event.id, endpoint);
                return Err(err);
            }
        };
        if !self.store.note_endpoint_submission(event.id, endpoint, &creation) {
            return Err(TixgateError::EndpointCreationInProgress(event.id));
        }
        tracing::info!(event = %event.id, endpoint = %endpoint, signature = %creation.signature, "Endpoint creation submitted");

        let outcome = match self.tracker.submit_and_track(&creation).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.store.release_endpoint(event.id, endpoint);
                return Err(err);
            }
        };
        match outcome {
            Confirmation::Confirmed { .. } => self.store.complete_endpoint(event.id, &creation.signature),
            Confirmation::Failed { reason, .. } => {
                self.store.release_endpoint(event.id, endpoint);
                Err(TixgateError::LedgerSubmissionFailed {
                    signature: creation.signature,
                    reason,
                })
            }
            Confirmation::TimedOut { attempts } => Err(TixgateError::ConfirmationTimeout {
                signature: creation.signature,
                attempts,
            }),
        }
    }

    /// Prepare a resale purchase.
    ///
    /// Every address is validated first; then the on-ledger listing must be
    /// active, the buyer must not be the seller, and the buyer's balance
    /// must cover the on-ledger price.
    pub async fn prepare_marketplace_purchase(
        &self,
        request: &PurchaseRequest<'_>,
    ) -> Result<PreparedPurchase> {
        let buyer = Address::parse("buyer_wallet", request.buyer_wallet)?;
        let recipient = Address::parse("buyer_recipient", request.buyer_recipient)?;
        let handle = Address::parse("listing", request.listing)?;
        let registry = Address::parse("registry", request.registry)?;
        let asset = Address::parse("asset", request.asset)?;

        let not_active = |status: &str| TixgateError::ListingNotActive {
            listing: handle.to_string(),
            status: status.to_string(),
        };
        let on_ledger = self
            .ledger
            .get_listing(&handle)
            .await?
            .ok_or_else(|| not_active("missing on ledger"))?;
        if !on_ledger.active {
            return Err(not_active("inactive on ledger"));
        }
        if on_ledger.asset != asset || on_ledger.registry != registry {
            return Err(not_active("ledger listing does not match"));
        }
        if on_ledger.seller == buyer || on_ledger.seller == recipient {
            tracing::warn!(listing = %handle, buyer = %buyer, "Self purchase rejected");
            return Err(TixgateError::SelfPurchaseRejected);
        }
        let available = self.ledger.get_balance(&buyer).await?;
        if available < on_ledger.price {
            return Err(TixgateError::InsufficientFunds {
                needed: on_ledger.price,
                available,
            });
        }

        let mut tx = Transaction::new(
            buyer.clone(),
            vec![Instruction::BuyListing {
                registry,
                listing: handle.clone(),
                buyer,
                recipient,
                seller: on_ledger.seller.clone(),
                asset,
                price: on_ledger.price,
                authority: on_ledger.authority.clone(),
            }],
        );
        let platform_signed = tx.requires_signer(self.platform.address());
        if platform_signed {
            self.platform.sign(&mut tx)?;
        }

        tracing::info!(listing = %handle, price = on_ledger.price, platform_signed, "Purchase prepared");
        Ok(PreparedPurchase {
            transaction: tx.to_base64()?,
            listing: handle,
            seller: on_ledger.seller,
            price: on_ledger.price,
            platform_signed,
        })
    }
}
