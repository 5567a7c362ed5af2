//! Platform users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, UserId};

/// A platform user, identified by an external wallet address.
///
/// `custodial_hint` caches the last derived custodial address. It is never
/// authoritative: the address is always recomputed from a fresh signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub wallet: Address,
    pub custodial_hint: Option<Address>,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn new(wallet: Address) -> Self {
        Self {
            id: UserId::new(),
            wallet,
            custodial_hint: None,
            created_at: Utc::now(),
        }
    }
}
