//! In-process memory tier.
//!
//! Entries live in a `HashMap` guarded by a tokio mutex. The tier keeps a
//! resident-entry threshold derived from its byte capacity and asks its
//! [`EvictionPolicy`] for a victim before inserting a new key at the threshold.

use std::collections::HashMap;

use async_trait::async_trait;
use tiercache_core::{
    CacheEntry, CacheResult, EvictionPolicyKind, TierDescriptor, TierStats,
};
use tokio::sync::Mutex;

use crate::eviction::{policy_for, EvictionPolicy};
use crate::tier::Tier;

/// Average entry size assumed when converting a byte capacity into an
/// entry threshold.
pub const ASSUMED_ENTRY_SIZE: u64 = 1024;

struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    policy: Box<dyn EvictionPolicy>,
    size_bytes: u64,
    evictions: u64,
}

impl MemoryState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.policy.on_remove(key);
        let entry = self.entries.remove(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.metadata.size as u64);
        Some(entry)
    }
}

/// Memory tier with pluggable eviction.
pub struct MemoryTier {
    descriptor: TierDescriptor,
    max_entries: usize,
    policy_kind: EvictionPolicyKind,
    state: Mutex<MemoryState>,
}

impl MemoryTier {
    pub fn new(descriptor: TierDescriptor, policy: EvictionPolicyKind) -> Self {
        Self::with_policy(descriptor, policy_for(policy))
    }

    /// Build a tier around a caller-supplied policy.
    pub fn with_policy(descriptor: TierDescriptor, policy: Box<dyn EvictionPolicy>) -> Self {
        let max_entries = (descriptor.capacity / ASSUMED_ENTRY_SIZE).max(1) as usize;
        Self {
            descriptor,
            max_entries,
            policy_kind: policy.kind(),
            state: Mutex::new(MemoryState {
                entries: HashMap::new(),
                policy,
                size_bytes: 0,
                evictions: 0,
            }),
        }
    }

    /// Resident-entry threshold.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn policy_kind(&self) -> EvictionPolicyKind {
        self.policy_kind
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Tier for MemoryTier {
    fn descriptor(&self) -> &TierDescriptor {
        &self.descriptor
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let mut state = self.state.lock().await;
        let entry = state.entries.get(key).cloned();
        if entry.is_some() {
            state.policy.on_access(key);
        }
        Ok(entry)
    }

    async fn set(&self, entry: CacheEntry) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        let key = entry.key.clone();
        let size = entry.metadata.size as u64;

        if let Some(previous) = state.entries.get(&key) {
            let previous_size = previous.metadata.size as u64;
            state.size_bytes = state.size_bytes.saturating_sub(previous_size) + size;
            state.entries.insert(key.clone(), entry);
            state.policy.on_access(&key);
            return Ok(());
        }

        while state.entries.len() >= self.max_entries {
            let Some(victim) = state.policy.victim() else {
                break;
            };
            state.remove(&victim);
            state.evictions += 1;
            tracing::debug!(tier = %self.descriptor.name, key = %victim, "Evicted entry");
        }

        state.entries.insert(key.clone(), entry);
        state.size_bytes += size;
        state.policy.on_insert(&key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.state.lock().await.remove(key).is_some())
    }

    async fn clear(&self) -> CacheResult<u64> {
        let mut state = self.state.lock().await;
        let removed = state.entries.len() as u64;
        state.entries.clear();
        state.policy.clear();
        state.size_bytes = 0;
        Ok(removed)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.state.lock().await.entries.keys().cloned().collect())
    }

    async fn keys_by_tag(&self, tags: &[String]) -> CacheResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .values()
            .filter(|entry| entry.metadata.has_any_tag(tags))
            .map(|entry| entry.key.clone())
            .collect())
    }

    async fn stats(&self) -> CacheResult<TierStats> {
        let state = self.state.lock().await;
        Ok(TierStats {
            size_bytes: state.size_bytes,
            entry_count: state.entries.len() as u64,
            evictions: state.evictions,
        })
    }
}
