//! # Listing: a resale offer for one ticket asset
//!
//! ## State Machine
//!
//! ```text
//!   ┌────────┐  purchase confirmed   ┌──────┐
//!   │ ACTIVE ├──────────────────────▶│ SOLD │
//!   └───┬────┘                       └──────┘
//!       │ cancellation confirmed
//!       ▼
//!   ┌───────────┐
//!   │ CANCELLED │
//!   └───────────┘
//! ```
//!
//! Both terminal states are final: no resurrection. Every transition happens
//! only after the corresponding ledger transaction is confirmed.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, ListingId, Result, TixgateError, UserId};

/// The lifecycle state of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Open for purchase.
    Active,
    /// A purchase was confirmed on the ledger. **Irreversible.**
    Sold,
    /// The seller's cancellation was confirmed on the ledger. **Irreversible.**
    Cancelled,
}

impl ListingStatus {
    /// Can this listing transition to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Active, Self::Sold | Self::Cancelled))
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Sold => write!(f, "SOLD"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// How an ask compares to the ticket's issuance price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceComparison {
    Higher,
    Lower,
    Same,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    /// The ticket asset on offer.
    pub asset: Address,
    pub seller: UserId,
    /// Ledger address the seller's proceeds go to (their custodial address).
    pub seller_address: Address,
    pub price: u64,
    pub original_price: u64,
    pub status: ListingStatus,
    /// On-ledger listing account.
    pub ledger_handle: Address,
    /// Transaction that created the on-ledger listing.
    pub listing_signature: String,
    pub buyer: Option<UserId>,
    /// Purchase or cancellation transaction, once terminal.
    pub closing_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Listing {
    #[must_use]
    pub fn price_comparison(&self) -> PriceComparison {
        match self.price.cmp(&self.original_price) {
            Ordering::Greater => PriceComparison::Higher,
            Ordering::Less => PriceComparison::Lower,
            Ordering::Equal => PriceComparison::Same,
        }
    }

    /// Ask minus issuance price (negative when listed below issuance).
    #[must_use]
    pub fn price_difference(&self) -> i128 {
        i128::from(self.price) - i128::from(self.original_price)
    }

    /// Percentage change against the issuance price, two decimals.
    /// `None` for free tickets.
    #[must_use]
    pub fn price_change_pct(&self) -> Option<Decimal> {
        if self.original_price == 0 {
            return None;
        }
        let diff = Decimal::from_i128_with_scale(self.price_difference(), 0);
        let pct = diff * Decimal::ONE_HUNDRED / Decimal::from(self.original_price);
        Some(pct.round_dp(2))
    }

    /// `Active → Sold`, stamping buyer and purchase transaction.
    ///
    /// # Errors
    /// Returns [`TixgateError::ListingNotActive`] from a terminal state.
    pub fn mark_sold(&mut self, buyer: UserId, signature: &str) -> Result<()> {
        self.transition(ListingStatus::Sold)?;
        self.buyer = Some(buyer);
        self.closing_signature = Some(signature.to_string());
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    /// `Active → Cancelled`, stamping the cancellation transaction.
    ///
    /// # Errors
    /// Returns [`TixgateError::ListingNotActive`] from a terminal state.
    pub fn mark_cancelled(&mut self, signature: &str) -> Result<()> {
        self.transition(ListingStatus::Cancelled)?;
        self.closing_signature = Some(signature.to_string());
        self.closed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, target: ListingStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(TixgateError::ListingNotActive {
                listing: self.id.to_string(),
                status: self.status.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Listing {
    /// An active listing with random addresses.
    pub fn dummy(price: u64, original_price: u64) -> Self {
        Self {
            id: ListingId::new(),
            asset: Address::random(),
            seller: UserId::new(),
            seller_address: Address::random(),
            price,
            original_price,
            status: ListingStatus::Active,
            ledger_handle: Address::random(),
            listing_signature: "list-sig".to_string(),
            buyer: None,
            closing_signature: None,
            created_at: Utc::now(),
            closed_at: None,
        }
    }
}
