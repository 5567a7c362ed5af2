//! Primary sales: mint tickets from an event's issuance endpoint.
//!
//! ```text
//! prepare_mint ──▶ wallet signs + submits ──▶ confirm_mint(signature)
//!                                               │
//!                       ┌───────────────────────┼──────────────────────┐
//!                       ▼                       ▼                      ▼
//!                 Failed: order          TimedOut: nothing        Confirmed: tickets
//!                 marked failed          changes, retry later     recorded, revenue
//!                                                                 distributed
//! ```

use chrono::Utc;
use serde::Serialize;
use tixgate_ledger::{Confirmation, EffectExtractor, Transaction};
use tixgate_types::{
    DistributionReplay, Event, EventId, Order, OrderId, OrderStatus, PaymentDistribution,
    PendingSubmission, Result, Ticket, TixgateError,
};

use crate::builder::PreparedMint;
use crate::engine::SettlementEngine;
use crate::revenue::Payout;
use crate::session::Session;

/// Whether the organizer has been paid for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DistributionOutcome {
    Distributed(PaymentDistribution),
    /// The payout failed; the mint stands and the payout can be retried.
    Deferred(DistributionReplay),
}

/// Result of [`SettlementEngine::confirm_mint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintSettlement {
    pub order: Order,
    pub tickets: Vec<Ticket>,
    pub distribution: DistributionOutcome,
}

impl SettlementEngine {
    /// Phase one of a primary purchase.
    pub async fn prepare_mint(
        &self,
        session: &Session,
        event_id: EventId,
        quantity: u32,
    ) -> Result<PreparedMint> {
        self.builder.prepare_mint(event_id, session, quantity).await
    }

    /// Phase two of a primary purchase.
    ///
    /// The signature must be the buyer's over the transaction prepared for
    /// this order; any other is [`TixgateError::ForeignTransaction`].
    /// Re-confirming an already confirmed order with the same signature
    /// returns the recorded result.
    pub async fn confirm_mint(
        &self,
        session: &Session,
        order_id: OrderId,
        signature: &str,
    ) -> Result<MintSettlement> {
        let order = self.store.order(order_id)?;
        if order.user_id != session.user_id {
            return Err(TixgateError::NotOwner {
                subject: order_id.to_string(),
            });
        }
        match order.status {
            OrderStatus::Confirmed if order.tx_signature.as_deref() == Some(signature) => {
                let event = self.store.event(order.event_id)?;
                let tickets = self.store.tickets_for_order(order.id);
                let distribution = self.distribution_for(&order, &event).await?;
                return Ok(MintSettlement {
                    order,
                    tickets,
                    distribution,
                });
            }
            OrderStatus::Confirmed | OrderStatus::Failed => {
                return Err(TixgateError::OrderNotPending {
                    order: order.id,
                    status: order.status.to_string(),
                });
            }
            OrderStatus::Pending => {}
        }
        let prepared = order
            .prepared_transaction
            .as_deref()
            .map(Transaction::from_base64)
            .transpose()?;
        if !prepared.is_some_and(|tx| tx.is_identified_by(signature)) {
            tracing::warn!(order = %order.id, signature = %signature, "Signature does not match the prepared mint");
            return Err(TixgateError::ForeignTransaction {
                signature: signature.to_string(),
                subject: order.id.to_string(),
            });
        }

        match self.tracker.track(signature).await {
            Confirmation::Confirmed { .. } => {}
            Confirmation::Failed { reason, .. } => {
                self.store.fail_order(order.id, signature, &reason)?;
                tracing::warn!(order = %order.id, signature = %signature, reason = %reason, "Mint failed on ledger");
                return Err(TixgateError::LedgerSubmissionFailed {
                    signature: signature.to_string(),
                    reason,
                });
            }
            Confirmation::TimedOut { attempts } => {
                tracing::warn!(order = %order.id, signature = %signature, "Mint unconfirmed, order left pending");
                return Err(TixgateError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    attempts,
                });
            }
        }

        let effects = self
            .ledger
            .get_parsed_effects(signature)
            .await?
            .ok_or_else(|| TixgateError::LedgerUnavailable {
                reason: format!("effects of {signature} not yet visible"),
            })?;
        let assets = EffectExtractor::new(&order.recipient).require(&effects)?;
        if assets.len() != order.quantity as usize {
            tracing::error!(
                order = %order.id,
                signature = %signature,
                ordered = order.quantity,
                minted = assets.len(),
                "Minted count differs from ordered quantity"
            );
            return Err(TixgateError::ReconciliationFailed {
                signature: signature.to_string(),
                buyer: order.recipient.clone(),
                reason: format!("ordered {} tickets, ledger minted {}", order.quantity, assets.len()),
                assets,
            });
        }

        let record = self
            .store
            .record_mint(order.id, signature, &assets)
            .map_err(|err| {
                tracing::error!(order = %order.id, signature = %signature, error = %err, "Mint confirmed but not recorded");
                TixgateError::ReconciliationFailed {
                    signature: signature.to_string(),
                    buyer: order.recipient.clone(),
                    assets: assets.clone(),
                    reason: err.to_string(),
                }
            })?;
        tracing::info!(
            order = %record.order.id,
            signature = %signature,
            tickets = record.tickets.len(),
            "Mint confirmed"
        );

        let event = self.store.event(order.event_id)?;
        let distribution = if record.newly_recorded {
            self.distribute(&record.order, &event, None).await?
        } else {
            self.distribution_for(&record.order, &event).await?
        };
        Ok(MintSettlement {
            order: record.order,
            tickets: record.tickets,
            distribution,
        })
    }

    /// Retry the organizer payout of a confirmed order.
    ///
    /// # Errors
    /// [`TixgateError::DistributionFailed`] if the payout fails again; the
    /// replay row stays for a later attempt.
    pub async fn retry_distribution(&self, order_id: OrderId) -> Result<PaymentDistribution> {
        if let Some(done) = self.store.distribution(order_id) {
            return Ok(done);
        }
        let order = self.store.order(order_id)?;
        if order.status != OrderStatus::Confirmed {
            return Err(TixgateError::DistributionFailed {
                order: order_id,
                reason: format!("order is {}", order.status),
            });
        }
        let event = self.store.event(order.event_id)?;
        let previous = self
            .store
            .distribution_replay(order_id)
            .and_then(|replay| replay.last_transfer);

        match self.distribute(&order, &event, previous.as_ref()).await? {
            DistributionOutcome::Distributed(done) => Ok(done),
            DistributionOutcome::Deferred(replay) => Err(TixgateError::DistributionFailed {
                order: order_id,
                reason: replay.reason,
            }),
        }
    }

    /// The recorded payout state, paying out if neither a payout nor a
    /// replay row exists yet.
    async fn distribution_for(&self, order: &Order, event: &Event) -> Result<DistributionOutcome> {
        if let Some(done) = self.store.distribution(order.id) {
            return Ok(DistributionOutcome::Distributed(done));
        }
        if let Some(replay) = self.store.distribution_replay(order.id) {
            return Ok(DistributionOutcome::Deferred(replay));
        }
        self.distribute(order, event, None).await
    }

    async fn distribute(
        &self,
        order: &Order,
        event: &Event,
        previous: Option<&PendingSubmission>,
    ) -> Result<DistributionOutcome> {
        let payout = self
            .splitter
            .distribute(order.id, order.total_price, &event.organizer, previous)
            .await?;
        match payout {
            Payout::Distributed(distribution) => Ok(DistributionOutcome::Distributed(
                self.store.record_distribution(distribution),
            )),
            Payout::Failed {
                split,
                pending,
                reason,
            } => {
                let replay = self.store.record_distribution_failure(DistributionReplay {
                    order_id: order.id,
                    split,
                    organizer_address: event.organizer.clone(),
                    last_transfer: pending,
                    reason,
                    attempts: 0,
                    updated_at: Utc::now(),
                });
                tracing::warn!(
                    order = %order.id,
                    attempts = replay.attempts,
                    reason = %replay.reason,
                    "Distribution deferred; mint stays confirmed"
                );
                Ok(DistributionOutcome::Deferred(replay))
            }
        }
    }
}
