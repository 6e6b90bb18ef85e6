//! Advisory lock records.
//!
//! Locks are cooperative markers: cache reads and writes never consult them.
//!
//! # State Transition Diagram
//!
//! ```text
//! (unlocked) ─── lock() ──→ Locked(id, expiry) ─── unlock(id) ──→ (unlocked)
//!                                  │
//!                            expiry timer ──→ (unlocked)
//! ```

use crate::{add_duration, new_entity_id, EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A held advisory lock on a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryLock {
    pub lock_id: EntityId,
    pub key: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl AdvisoryLock {
    /// Create a lock on `key` acquired at `now`, expiring after `ttl`.
    pub fn new(key: impl Into<String>, now: Timestamp, ttl: Duration) -> Self {
        Self {
            lock_id: new_entity_id(),
            key: key.into(),
            acquired_at: now,
            expires_at: add_duration(now, ttl),
        }
    }

    /// Check if the lock has expired based on current time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Calculate remaining duration until expiry.
    pub fn remaining_duration(&self, now: Timestamp) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            (self.expires_at - now).to_std().ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_lock_expiry() {
        let now = Utc::now();
        let lock = AdvisoryLock::new("x", now, Duration::from_millis(50));
        assert!(!lock.is_expired(now));
        assert!(lock.is_expired(now + chrono::Duration::milliseconds(50)));
        assert_eq!(lock.remaining_duration(now), Some(Duration::from_millis(50)));
        assert!(lock
            .remaining_duration(now + chrono::Duration::milliseconds(60))
            .is_none());
    }

    #[test]
    fn test_lock_ids_are_unique() {
        let now = Utc::now();
        let a = AdvisoryLock::new("x", now, Duration::from_secs(1));
        let b = AdvisoryLock::new("x", now, Duration::from_secs(1));
        assert_ne!(a.lock_id, b.lock_id);
    }
}
