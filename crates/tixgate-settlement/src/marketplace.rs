//! Resale marketplace: list, cancel, and buy tickets.
//!
//! Listing and cancelling are signed server-side with the seller's custodial
//! key, rebuilt from the signature on the request. Buying is signed by the
//! buyer's wallet, like a mint.
//!
//! Local listing state only moves after the ledger confirms:
//!
//! ```text
//!   reserve ──▶ submit ──▶ confirmed ──▶ ACTIVE ──┬──▶ SOLD       (confirm_buy)
//!      │                                          └──▶ CANCELLED  (cancel / confirm_cancel)
//!      └── rejected: reservation released; timed out: kept, resume_listing
//! ```

use chrono::Utc;
use ed25519_dalek::SigningKey;
use serde::Serialize;
use tixgate_ledger::{Confirmation, EffectExtractor, Instruction, Transaction};
use tixgate_types::{
    Address, Listing, ListingId, ListingStatus, PendingSubmission, Result, Ticket, TixgateError,
};

use crate::builder::{PreparedPurchase, PurchaseRequest};
use crate::engine::{AuthenticatedUser, ListingView, SettlementEngine};
use crate::session::Session;
use crate::store::{ListingReservation, Transition};

/// Result of [`SettlementEngine::confirm_buy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseSettlement {
    pub listing: ListingView,
    pub ticket: Ticket,
}

fn not_active(listing: &Listing) -> TixgateError {
    TixgateError::ListingNotActive {
        listing: listing.id.to_string(),
        status: listing.status.to_string(),
    }
}

impl SettlementEngine {
    /// List a ticket the caller owns for resale at `price`.
    ///
    /// # Errors
    /// [`TixgateError::DuplicateActiveListing`] if the asset is already listed
    /// or being listed; [`TixgateError::ConfirmationTimeout`] keeps the
    /// reservation for [`resume_listing`](Self::resume_listing).
    pub async fn create_listing(
        &self,
        seller: &AuthenticatedUser,
        asset: &str,
        price: u64,
    ) -> Result<ListingView> {
        let asset = Address::parse("asset", asset)?;
        if price == 0 {
            return Err(TixgateError::InvalidAmount {
                reason: "listing price must be positive".into(),
            });
        }
        let registry = self.registry()?;
        let ticket = self.store.ticket_by_asset(&asset)?;
        if ticket.owner != seller.session.user_id {
            return Err(TixgateError::NotOwner {
                subject: asset.to_string(),
            });
        }

        self.store
            .reserve_listing(&asset, seller.session.user_id, price)?;

        let listing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let handle = Address::from_verifying_key(&listing_key.verifying_key());
        let mut tx = Transaction::new(
            self.platform_address().clone(),
            vec![Instruction::ListAsset {
                registry,
                listing: handle.clone(),
                seller: seller.custodial_address().clone(),
                asset: asset.clone(),
                price,
            }],
        );
        let signed = self
            .platform()
            .sign(&mut tx)
            .and_then(|()| seller.keypair.sign(&mut tx))
            .and_then(|()| tx.sign(&listing_key))
            .and_then(|()| tx.to_pending());
        let submission = match signed {
            Ok(submission) => submission,
            Err(err) => {
                self.store.release_listing_reservation(&asset);
                return Err(err);
            }
        };
        self.store
            .note_listing_submission(&asset, &handle, &submission);
        tracing::info!(asset = %asset, listing = %handle, price, signature = %submission.signature, "Listing submitted");

        let reservation = ListingReservation {
            asset,
            seller: seller.session.user_id,
            price,
            handle: Some(handle.clone()),
            submission: Some(submission.clone()),
        };
        self.finish_listing(reservation, &handle, &submission, &ticket, seller.custodial_address())
            .await
    }

    /// Re-check a listing whose creation timed out. The recorded transaction
    /// is re-sent as-is, so it lands at most once.
    pub async fn resume_listing(&self, session: &Session, asset: &str) -> Result<ListingView> {
        let asset = Address::parse("asset", asset)?;
        if let Some(active) = self.store.active_listing_for(&asset) {
            if active.seller != session.user_id {
                return Err(TixgateError::NotOwner {
                    subject: asset.to_string(),
                });
            }
            return Ok(active.into());
        }
        let reservation = self.store.listing_reservation(&asset).ok_or_else(|| {
            TixgateError::ListingNotActive {
                listing: asset.to_string(),
                status: "no listing in flight".into(),
            }
        })?;
        if reservation.seller != session.user_id {
            return Err(TixgateError::NotOwner {
                subject: asset.to_string(),
            });
        }
        let (Some(handle), Some(submission)) =
            (reservation.handle.clone(), reservation.submission.clone())
        else {
            return Err(TixgateError::ListingNotActive {
                listing: asset.to_string(),
                status: "listing not yet submitted".into(),
            });
        };
        let ticket = self.store.ticket_by_asset(&asset)?;
        self.finish_listing(reservation, &handle, &submission, &ticket, &session.custodial_address)
            .await
    }

    async fn finish_listing(
        &self,
        reservation: ListingReservation,
        handle: &Address,
        submission: &PendingSubmission,
        ticket: &Ticket,
        seller_address: &Address,
    ) -> Result<ListingView> {
        let signature = submission.signature.as_str();
        let outcome = match self.tracker.submit_and_track(submission).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.store.release_listing_reservation(&reservation.asset);
                tracing::warn!(asset = %reservation.asset, signature = %signature, error = %err, "Listing refused by ledger");
                return Err(err);
            }
        };
        match outcome {
            Confirmation::Confirmed { .. } => {}
            Confirmation::Failed { reason, .. } => {
                self.store.release_listing_reservation(&reservation.asset);
                tracing::warn!(asset = %reservation.asset, signature = %signature, reason = %reason, "Listing rejected by ledger");
                return Err(TixgateError::LedgerSubmissionFailed {
                    signature: signature.to_string(),
                    reason,
                });
            }
            Confirmation::TimedOut { attempts } => {
                tracing::warn!(asset = %reservation.asset, signature = %signature, "Listing unconfirmed, reservation kept");
                return Err(TixgateError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    attempts,
                });
            }
        }

        let listing = self.store.activate_listing(Listing {
            id: ListingId::new(),
            asset: reservation.asset,
            seller: reservation.seller,
            seller_address: seller_address.clone(),
            price: reservation.price,
            original_price: ticket.original_price,
            status: ListingStatus::Active,
            ledger_handle: handle.clone(),
            listing_signature: signature.to_string(),
            buyer: None,
            closing_signature: None,
            created_at: Utc::now(),
            closed_at: None,
        })?;
        tracing::info!(
            listing = %listing.id,
            asset = %listing.asset,
            price = listing.price,
            original_price = listing.original_price,
            "Listing active"
        );
        Ok(listing.into())
    }

    /// Cancel an active listing the caller owns.
    pub async fn cancel_listing(
        &self,
        seller: &AuthenticatedUser,
        listing_id: ListingId,
    ) -> Result<ListingView> {
        let listing = self.store.listing(listing_id)?;
        if listing.seller != seller.session.user_id
            || &listing.seller_address != seller.custodial_address()
        {
            return Err(TixgateError::NotOwner {
                subject: listing_id.to_string(),
            });
        }
        if listing.status != ListingStatus::Active {
            return Err(not_active(&listing));
        }
        let registry = self.registry()?;

        let mut tx = Transaction::new(
            self.platform_address().clone(),
            vec![Instruction::CancelListing {
                registry,
                listing: listing.ledger_handle.clone(),
                seller: listing.seller_address.clone(),
                asset: listing.asset.clone(),
            }],
        );
        self.platform().sign(&mut tx)?;
        seller.keypair.sign(&mut tx)?;
        let submission = tx.to_pending()?;
        tracing::info!(listing = %listing_id, signature = %submission.signature, "Cancellation submitted");

        self.tracker
            .submit_and_track(&submission)
            .await?
            .into_result(&submission.signature)?;
        self.finish_cancel(listing_id, &submission.signature)
    }

    /// Finish (or re-check) a cancellation by its signature.
    pub async fn confirm_cancel_listing(
        &self,
        session: &Session,
        listing_id: ListingId,
        signature: &str,
    ) -> Result<ListingView> {
        let listing = self.store.listing(listing_id)?;
        if listing.seller != session.user_id {
            return Err(TixgateError::NotOwner {
                subject: listing_id.to_string(),
            });
        }
        match listing.status {
            ListingStatus::Cancelled if listing.closing_signature.as_deref() == Some(signature) => {
                return Ok(listing.into());
            }
            ListingStatus::Active => {}
            ListingStatus::Sold | ListingStatus::Cancelled => return Err(not_active(&listing)),
        }

        self.tracker.track(signature).await.into_result(signature)?;
        self.finish_cancel(listing_id, signature)
    }

    fn finish_cancel(&self, listing_id: ListingId, signature: &str) -> Result<ListingView> {
        let cancelled = self.store.cancel_listing(listing_id, signature)?;
        if let Transition::Applied(listing) = &cancelled {
            tracing::info!(listing = %listing.id, asset = %listing.asset, "Listing cancelled");
        }
        Ok(cancelled.into_listing().into())
    }

    /// Phase one of a resale purchase.
    pub async fn prepare_buy(
        &self,
        buyer: &Session,
        listing_id: ListingId,
    ) -> Result<PreparedPurchase> {
        let listing = self.store.listing(listing_id)?;
        if listing.status != ListingStatus::Active {
            return Err(not_active(&listing));
        }
        if listing.seller == buyer.user_id {
            tracing::warn!(listing = %listing_id, user = %buyer.user_id, "Self purchase rejected");
            return Err(TixgateError::SelfPurchaseRejected);
        }
        let registry = self.registry()?;
        self.builder
            .prepare_marketplace_purchase(&PurchaseRequest {
                buyer_wallet: buyer.wallet.as_str(),
                buyer_recipient: buyer.custodial_address.as_str(),
                listing: listing.ledger_handle.as_str(),
                registry: registry.as_str(),
                asset: listing.asset.as_str(),
            })
            .await
    }

    /// Phase two of a resale purchase.
    ///
    /// On a listing that is already sold this returns the recorded sale
    /// without asking the ledger.
    pub async fn confirm_buy(
        &self,
        buyer: &Session,
        listing_id: ListingId,
        signature: &str,
    ) -> Result<PurchaseSettlement> {
        let listing = self.store.listing(listing_id)?;
        match listing.status {
            ListingStatus::Sold => {
                let ticket = self.store.ticket_by_asset(&listing.asset)?;
                return Ok(PurchaseSettlement {
                    listing: listing.into(),
                    ticket,
                });
            }
            ListingStatus::Cancelled => return Err(not_active(&listing)),
            ListingStatus::Active => {}
        }

        self.tracker.track(signature).await.into_result(signature)?;
        let effects = self
            .ledger
            .get_parsed_effects(signature)
            .await?
            .ok_or_else(|| TixgateError::LedgerUnavailable {
                reason: format!("effects of {signature} not yet visible"),
            })?;
        if !EffectExtractor::new(&buyer.custodial_address).received(&effects, &listing.asset) {
            tracing::error!(listing = %listing_id, signature = %signature, "Purchase confirmed without delivering the asset");
            return Err(TixgateError::EffectExtractionEmpty {
                signature: signature.to_string(),
                recipient: buyer.custodial_address.clone(),
            });
        }

        let sale = self
            .store
            .complete_sale(listing_id, buyer.user_id, signature)
            .map_err(|err| {
                tracing::error!(listing = %listing_id, signature = %signature, error = %err, "Purchase confirmed but not recorded");
                TixgateError::ReconciliationFailed {
                    signature: signature.to_string(),
                    buyer: buyer.custodial_address.clone(),
                    assets: vec![listing.asset.clone()],
                    reason: err.to_string(),
                }
            })?;
        match &sale {
            Transition::Applied(sold) => tracing::info!(
                listing = %sold.id,
                asset = %sold.asset,
                price = sold.price,
                signature = %signature,
                "Resale settled"
            ),
            Transition::AlreadyApplied(_) => {
                tracing::debug!(listing = %listing_id, "Resale already recorded");
            }
        }
        let ticket = self.store.ticket_by_asset(&listing.asset)?;
        Ok(PurchaseSettlement {
            listing: sale.into_listing().into(),
            ticket,
        })
    }
}
