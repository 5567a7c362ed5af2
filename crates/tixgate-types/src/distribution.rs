//! Revenue distribution records for primary sales.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, OrderId, PendingSubmission};

/// Organizer/platform split of one gross amount.
///
/// Invariant: `organizer_share + platform_share == gross`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSplit {
    pub gross: u64,
    pub organizer_share: u64,
    pub platform_share: u64,
    pub fee_bps: u16,
}

impl RevenueSplit {
    /// Fee as a percentage (250 bps → 2.50).
    #[must_use]
    pub fn fee_percent(&self) -> Decimal {
        Decimal::new(i64::from(self.fee_bps), 2)
    }
}

/// A confirmed organizer payout for one order. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDistribution {
    pub order_id: OrderId,
    pub split: RevenueSplit,
    pub organizer_address: Address,
    pub platform_address: Address,
    /// Transfer transaction; `None` only when the organizer share is zero
    /// and nothing was sent.
    pub transfer_signature: Option<String>,
    pub distributed_at: DateTime<Utc>,
}

/// A distribution that failed after its mint was confirmed, kept for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionReplay {
    pub order_id: OrderId,
    pub split: RevenueSplit,
    pub organizer_address: Address,
    /// Last transfer that may have reached the ledger. A replay re-sends
    /// and re-checks it before building another.
    pub last_transfer: Option<PendingSubmission>,
    pub reason: String,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}
