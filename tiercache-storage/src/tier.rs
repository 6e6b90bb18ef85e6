//! The tier contract.

use async_trait::async_trait;
use tiercache_core::{CacheEntry, CacheResult, TierDescriptor, TierStats};

/// One storage layer in the hierarchy.
///
/// Tiers store entries exactly as given and return them exactly as stored,
/// expired or not; expiry, promotion and fan-out are the coordinator's job.
/// A miss is `Ok(None)`. Backing-store failures surface as
/// `TierError::Transport`.
#[async_trait]
pub trait Tier: Send + Sync {
    fn descriptor(&self) -> &TierDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Insert or replace the entry stored under `entry.key`.
    async fn set(&self, entry: CacheEntry) -> CacheResult<()>;

    /// Remove a key. Returns whether it was resident.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove everything. Returns the number of entries removed.
    async fn clear(&self) -> CacheResult<u64>;

    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Keys whose entries carry any of `tags`.
    async fn keys_by_tag(&self, tags: &[String]) -> CacheResult<Vec<String>>;

    async fn stats(&self) -> CacheResult<TierStats>;

    /// Release backing resources. Further calls may fail.
    async fn shutdown(&self) -> CacheResult<()> {
        Ok(())
    }
}
