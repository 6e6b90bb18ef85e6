//! tiercache Storage - Tier Contract and Implementations
//!
//! Defines the [`Tier`] abstraction the coordinator fans out over, the
//! in-process [`MemoryTier`] with pluggable eviction, and [`BackendTier`]
//! adapters over raw key/value backends (in-memory stand-in and LMDB).

pub mod backend;
pub mod backend_tier;
pub mod eviction;
pub mod memory;
pub mod tier;

use std::sync::Arc;

pub use backend::{
    BackendError, BackendResult, InMemoryBackend, KvBackend, LmdbBackend, LmdbBackendError,
};
pub use backend_tier::BackendTier;
pub use eviction::{policy_for, EvictionPolicy, FifoPolicy, LfuPolicy, LruPolicy};
pub use memory::{MemoryTier, ASSUMED_ENTRY_SIZE};
pub use tier::Tier;

use tiercache_core::{CacheConfig, CacheError, CacheResult, TierDescriptor, TierKind};

/// Build the default implementation for a configured tier.
///
/// Memory tiers get a [`MemoryTier`] capped by `max_size`. Disk tiers with a
/// `location` open an [`LmdbBackend`] there; every other non-memory tier is
/// served by an [`InMemoryBackend`] stand-in.
pub fn build_tier(descriptor: &TierDescriptor, config: &CacheConfig) -> CacheResult<Arc<dyn Tier>> {
    let mut descriptor = descriptor.clone();
    descriptor.capacity = config.effective_capacity(&descriptor);

    let tier: Arc<dyn Tier> = match (descriptor.kind, descriptor.location.clone()) {
        (TierKind::Memory, _) => Arc::new(MemoryTier::new(descriptor, config.eviction_policy)),
        (TierKind::Disk, Some(location)) => {
            let backend = LmdbBackend::open(&location, descriptor.capacity).map_err(|e| {
                CacheError::transport(descriptor.name.clone(), e.to_string())
            })?;
            Arc::new(BackendTier::new(descriptor, backend))
        }
        _ => Arc::new(BackendTier::new(descriptor, InMemoryBackend::new())),
    };

    tracing::debug!(
        tier = %tier.name(),
        kind = %tier.descriptor().kind,
        priority = tier.descriptor().priority,
        "Built tier"
    );
    Ok(tier)
}
