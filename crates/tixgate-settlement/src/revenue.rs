//! Revenue split and organizer payout for primary sales.
//!
//! Mint proceeds land in the platform treasury. After a mint is confirmed,
//! the organizer share is transferred out:
//!
//! ```text
//! platform  = floor(gross * fee_bps / 10_000)
//! organizer = gross - platform
//! ```
//!
//! A payout only counts once its transfer is confirmed. The signed transfer
//! is recorded before it is sent; if its outcome is unknown (timeout or lost
//! acknowledgement) it is kept and re-sent byte for byte before any new
//! transfer is built.

use chrono::Utc;
use tixgate_ledger::{Confirmation, ConfirmationTracker, Instruction, Transaction};
use tixgate_types::{
    constants, Address, OrderId, PaymentDistribution, PendingSubmission, Result, RevenueSplit,
    TixgateError,
};

use crate::config::PlatformAuthority;

/// Split `gross` into organizer and platform shares.
///
/// # Errors
/// Returns [`TixgateError::InvalidAmount`] if `fee_bps` exceeds 10 000.
pub fn split(gross: u64, fee_bps: u16) -> Result<RevenueSplit> {
    if u64::from(fee_bps) > constants::BPS_DENOMINATOR {
        return Err(TixgateError::InvalidAmount {
            reason: format!("fee {fee_bps} bps exceeds {}", constants::BPS_DENOMINATOR),
        });
    }
    let platform = u128::from(gross) * u128::from(fee_bps) / u128::from(constants::BPS_DENOMINATOR);
    // platform <= gross, so it fits back into u64.
    let platform_share = u64::try_from(platform)
        .map_err(|_| TixgateError::Internal("platform share overflow".into()))?;
    Ok(RevenueSplit {
        gross,
        organizer_share: gross - platform_share,
        platform_share,
        fee_bps,
    })
}

/// Outcome of one payout attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payout {
    Distributed(PaymentDistribution),
    Failed {
        split: RevenueSplit,
        /// Set when the transfer may have reached the ledger.
        pending: Option<PendingSubmission>,
        reason: String,
    },
}

/// Sends organizer payouts from the platform treasury.
#[derive(Clone)]
pub struct RevenueSplitter {
    tracker: ConfirmationTracker,
    platform: PlatformAuthority,
    fee_bps: u16,
}

impl RevenueSplitter {
    #[must_use]
    pub fn new(tracker: ConfirmationTracker, platform: PlatformAuthority, fee_bps: u16) -> Self {
        Self {
            tracker,
            platform,
            fee_bps,
        }
    }

    #[must_use]
    pub fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// Pay the organizer share of `gross` for `order_id`.
    ///
    /// `previous` is an earlier transfer whose outcome was never learned. It
    /// is re-sent and re-checked first; only once it has definitely failed is
    /// a new transfer built.
    pub async fn distribute(
        &self,
        order_id: OrderId,
        gross: u64,
        organizer: &Address,
        previous: Option<&PendingSubmission>,
    ) -> Result<Payout> {
        let split = split(gross, self.fee_bps)?;

        if let Some(pending) = previous {
            match self.send(order_id, split, organizer, pending).await {
                Payout::Failed {
                    pending: None,
                    reason,
                    ..
                } => {
                    tracing::info!(order = %order_id, signature = %pending.signature, reason = %reason, "Earlier payout transfer failed, sending a new one");
                }
                settled => return Ok(settled),
            }
        }

        if split.organizer_share == 0 {
            return Ok(Payout::Distributed(self.record(order_id, split, organizer, None)));
        }

        let mut tx = Transaction::new(
            self.platform.address().clone(),
            vec![Instruction::Transfer {
                from: self.platform.address().clone(),
                to: organizer.clone(),
                amount: split.organizer_share,
            }],
        );
        self.platform.sign(&mut tx)?;
        let pending = tx.to_pending()?;
        Ok(self.send(order_id, split, organizer, &pending).await)
    }

    async fn send(
        &self,
        order_id: OrderId,
        split: RevenueSplit,
        organizer: &Address,
        pending: &PendingSubmission,
    ) -> Payout {
        let signature = &pending.signature;
        match self.tracker.submit_and_track(pending).await {
            Ok(Confirmation::Confirmed { .. }) => {
                tracing::info!(
                    order = %order_id,
                    signature = %signature,
                    organizer_share = split.organizer_share,
                    platform_share = split.platform_share,
                    fee_percent = %split.fee_percent(),
                    "Revenue distributed"
                );
                Payout::Distributed(self.record(order_id, split, organizer, Some(signature)))
            }
            Ok(Confirmation::Failed { reason, .. }) => {
                tracing::warn!(order = %order_id, signature = %signature, reason = %reason, "Payout transfer failed");
                Payout::Failed {
                    split,
                    pending: None,
                    reason,
                }
            }
            Ok(Confirmation::TimedOut { attempts }) => {
                tracing::warn!(order = %order_id, signature = %signature, attempts, "Payout transfer unconfirmed");
                Payout::Failed {
                    split,
                    reason: format!("transfer {signature} unconfirmed after {attempts} polls"),
                    pending: Some(pending.clone()),
                }
            }
            Err(err) => {
                tracing::warn!(order = %order_id, signature = %signature, error = %err, "Payout transfer refused");
                Payout::Failed {
                    split,
                    pending: None,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn record(
        &self,
        order_id: OrderId,
        split: RevenueSplit,
        organizer: &Address,
        signature: Option<&str>,
    ) -> PaymentDistribution {
        PaymentDistribution {
            order_id,
            split,
            organizer_address: organizer.clone(),
            platform_address: self.platform.address().clone(),
            transfer_signature: signature.map(str::to_string),
            distributed_at: Utc::now(),
        }
    }
}
