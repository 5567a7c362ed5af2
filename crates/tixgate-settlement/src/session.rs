//! Short-lived authenticated sessions.
//!
//! A session remembers who signed in and where their assets live. It holds
//! no keys and no signatures: operations that must sign with the custodial
//! key ask for a fresh wallet signature instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tixgate_types::{Address, UserId};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub wallet: Address,
    pub custodial_address: Address,
    pub expires_at: DateTime<Utc>,
}

/// Engine-owned TTL map from session id to [`Session`].
#[derive(Debug, Clone)]
pub struct SessionCache {
    ttl: Duration,
    entries: Arc<Mutex<HashMap<SessionId, Session>>>,
}

impl SessionCache {
    #[must_use]
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, user_id: UserId, wallet: Address, custodial_address: Address) -> SessionId {
        let id = SessionId::new();
        self.lock().insert(
            id,
            Session {
                user_id,
                wallet,
                custodial_address,
                expires_at: Utc::now() + self.ttl,
            },
        );
        id
    }

    /// The live session, if any. Expired entries are dropped on access.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.get_at(id, Utc::now())
    }

    fn get_at(&self, id: SessionId, now: DateTime<Utc>) -> Option<Session> {
        let mut entries = self.lock();
        match entries.get(&id) {
            Some(session) if session.expires_at > now => Some(session.clone()),
            Some(_) => {
                entries.remove(&id);
                None
            }
            None => None,
        }
    }

    pub fn evict(&self, id: SessionId) {
        self.lock().remove(&id);
    }

    /// Drop every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_at(Utc::now())
    }

    fn purge_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, session| session.expires_at > now);
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_session_round_trip() {
        let cache = SessionCache::new(60);
        let wallet = Address::random();
        let id = cache.insert(UserId::new(), wallet.clone(), Address::random());
        assert_eq!(cache.get(id).unwrap().wallet, wallet);

        cache.evict(id);
        assert!(cache.get(id).is_none());
    }

    #[test]
    fn expired_sessions_disappear() {
        let cache = SessionCache::new(60);
        let id = cache.insert(UserId::new(), Address::random(), Address::random());
        let later = Utc::now() + Duration::seconds(61);
        assert!(cache.get_at(id, later).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_keeps_live_entries() {
        let cache = SessionCache::new(60);
        cache.insert(UserId::new(), Address::random(), Address::random());
        cache.insert(UserId::new(), Address::random(), Address::random());
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.purge_at(Utc::now() + Duration::hours(2)), 2);
        assert_eq!(cache.len(), 0);
    }
}
