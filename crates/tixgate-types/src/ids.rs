//! Globally unique identifiers for off-ledger records.
//!
//! All record IDs use UUIDv7 for time-ordered lexicographic sorting. Ledger
//! entities (assets, listings, endpoints) are identified by [`crate::Address`]
//! instead.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

record_id!(
    /// Unique identifier for a platform user (one per wallet address).
    UserId,
    "user"
);

record_id!(
    /// Identifier of an event whose tickets are issued through one endpoint.
    EventId,
    "event"
);

record_id!(
    /// Identifier of a primary-sale order.
    OrderId,
    "order"
);

record_id!(
    /// Identifier of a local ticket record.
    TicketId,
    "ticket"
);

record_id!(
    /// Identifier of a local resale listing record.
    ListingId,
    "listing"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_ordered() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn display_carries_prefix() {
        let id = ListingId::from_bytes([0u8; 16]);
        assert_eq!(
            id.to_string(),
            "listing:00000000-0000-0000-0000-000000000000"
        );
        assert!(EventId::new().to_string().starts_with("event:"));
    }
}
