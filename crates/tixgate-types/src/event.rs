//! Events and their issuance endpoints.
//!
//! Events are created by the surrounding CRUD layer. The settlement core only
//! reads them and decrements `tickets_available` after a confirmed mint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, EventId, PendingSubmission};

/// An event whose tickets are sold as single-edition NFTs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    /// Receives the organizer share of primary sales.
    pub organizer: Address,
    /// Issuance price per ticket, in ledger base units.
    pub ticket_price: u64,
    pub total_tickets: u32,
    pub tickets_available: u32,
    /// Next display index handed to a minted ticket (1-based).
    pub next_ticket_index: u32,
    pub created_at: DateTime<Utc>,
}

impl Event {
    #[must_use]
    pub fn new(name: impl Into<String>, organizer: Address, ticket_price: u64, total: u32) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            organizer,
            ticket_price,
            total_tickets: total,
            tickets_available: total,
            next_ticket_index: 1,
            created_at: Utc::now(),
        }
    }
}

/// State of the per-event issuance endpoint marker row.
///
/// The row is inserted before the on-ledger creation is attempted, so
/// concurrent first purchasers converge on a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointState {
    /// Claimed. `creation` is recorded before the creation transaction is
    /// sent; while it is `None` nothing has reached the ledger.
    Pending {
        address: Address,
        creation: Option<PendingSubmission>,
        claimed_at: DateTime<Utc>,
    },
    /// Created and confirmed on the ledger.
    Ready {
        address: Address,
        creation_signature: String,
    },
}

impl EndpointState {
    #[must_use]
    pub fn address(&self) -> &Address {
        match self {
            Self::Pending { address, .. } | Self::Ready { address, .. } => address,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_is_unsold() {
        let event = Event::new("Opening night", Address::random(), 2, 10);
        assert_eq!(event.tickets_available, 10);
        assert_eq!(event.next_ticket_index, 1);
    }
}
