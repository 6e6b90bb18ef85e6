//! Advisory per-key locks.
//!
//! Locks are cooperative markers; reads and writes never consult them. Each
//! lock arms an auto-release timer on the coordinator's scheduler. A timer
//! only releases the lock it was armed for, so it is harmless once that lock
//! has been unlocked or replaced.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tiercache_core::{AdvisoryLock, CacheResult, EntityId, LockError};
use tokio::sync::Mutex;

use crate::scheduler::{Scheduler, TaskId};

struct LockSlot {
    lock: AdvisoryLock,
    release_timer: Option<TaskId>,
}

/// Lock table keyed by cache key.
pub struct LockManager {
    slots: Arc<Mutex<HashMap<String, LockSlot>>>,
    scheduler: Scheduler,
}

impl LockManager {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            scheduler,
        }
    }

    /// Acquire a lock on `key` for `ttl`.
    ///
    /// Fails with `AlreadyLocked` while an unexpired lock exists.
    pub async fn lock(&self, key: &str, ttl: Duration) -> CacheResult<EntityId> {
        let now = Utc::now();
        let mut slots = self.slots.lock().await;

        if let Some(existing) = slots.get(key) {
            if !existing.lock.is_expired(now) {
                return Err(LockError::AlreadyLocked {
                    key: key.to_string(),
                }
                .into());
            }
            if let Some(timer) = existing.release_timer {
                self.scheduler.cancel(timer);
            }
        }

        let lock = AdvisoryLock::new(key, now, ttl);
        let lock_id = lock.lock_id;

        let release_timer = {
            let slots = Arc::clone(&self.slots);
            let key = key.to_string();
            self.scheduler.schedule_once("lock-release", ttl, async move {
                let mut slots = slots.lock().await;
                if slots.get(&key).map(|slot| slot.lock.lock_id) == Some(lock_id) {
                    slots.remove(&key);
                    tracing::debug!(key = %key, lock_id = %lock_id, "Lock expired");
                }
            })
        };

        slots.insert(
            key.to_string(),
            LockSlot {
                lock,
                release_timer,
            },
        );

        tracing::debug!(key = %key, lock_id = %lock_id, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
        Ok(lock_id)
    }

    /// Release a lock. A missing lock is a no-op; a mismatched id is an error.
    pub async fn unlock(&self, key: &str, lock_id: EntityId) -> CacheResult<()> {
        let mut slots = self.slots.lock().await;

        let Some(slot) = slots.get(key) else {
            return Ok(());
        };

        if slot.lock.lock_id != lock_id {
            return Err(LockError::InvalidLockId {
                key: key.to_string(),
                lock_id,
            }
            .into());
        }

        if let Some(slot) = slots.remove(key) {
            if let Some(timer) = slot.release_timer {
                self.scheduler.cancel(timer);
            }
        }

        tracing::debug!(key = %key, lock_id = %lock_id, "Lock released");
        Ok(())
    }

    /// Whether a live lock exists on `key`.
    pub async fn is_locked(&self, key: &str) -> bool {
        let now = Utc::now();
        self.slots
            .lock()
            .await
            .get(key)
            .is_some_and(|slot| !slot.lock.is_expired(now))
    }

    /// Current holder of `key`, if live.
    pub async fn holder(&self, key: &str) -> Option<AdvisoryLock> {
        let now = Utc::now();
        self.slots
            .lock()
            .await
            .get(key)
            .filter(|slot| !slot.lock.is_expired(now))
            .map(|slot| slot.lock.clone())
    }

    /// Drop any lock on `key` regardless of holder.
    pub async fn remove(&self, key: &str) {
        if let Some(slot) = self.slots.lock().await.remove(key) {
            if let Some(timer) = slot.release_timer {
                self.scheduler.cancel(timer);
            }
        }
    }

    pub async fn live_count(&self) -> usize {
        let now = Utc::now();
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| !slot.lock.is_expired(now))
            .count()
    }

    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        for (_, slot) in slots.drain() {
            if let Some(timer) = slot.release_timer {
                self.scheduler.cancel(timer);
            }
        }
    }
}
