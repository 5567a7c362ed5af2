//! Ticket records: the local mirror of one minted asset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, EventId, OrderId, TicketId, UserId};

/// One minted ticket asset.
///
/// `asset` is the join key to the ledger and is globally unique. `owner`
/// changes on resale only after the purchase is confirmed on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub order_id: OrderId,
    pub event_id: EventId,
    pub owner: UserId,
    pub asset: Address,
    /// Sequential display number within the event (1-based).
    pub display_index: u32,
    /// Issuance price, kept for resale price comparison.
    pub original_price: u64,
    pub is_valid: bool,
    pub is_used: bool,
    pub minted_at: DateTime<Utc>,
}
