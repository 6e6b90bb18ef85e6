//! tiercache Engine - Cache Coordinator
//!
//! Fronts an ordered set of storage tiers with one read/write/invalidate
//! surface. Adds promotion, strategy-driven fan-out, tag/pattern/dependency
//! invalidation, advisory locks, transactions, refresh scheduling, a
//! compression and encryption pipeline, statistics and an event stream.

pub mod codec;
pub mod coordinator;
pub mod dependencies;
pub mod events;
pub mod locks;
pub mod patterns;
pub mod scheduler;
pub mod sharding;
pub mod stats;
pub mod telemetry;
pub mod transactions;

pub use codec::{EncodedValue, ValueCodec};
pub use coordinator::{CacheCoordinator, CacheInfo, TierInfo};
pub use dependencies::DependencyIndex;
pub use events::EventBus;
pub use locks::LockManager;
pub use patterns::PatternRegistry;
pub use scheduler::{Scheduler, TaskId};
pub use sharding::{replica_indices, shard_index};
pub use stats::StatsRecorder;
pub use telemetry::init_tracing;
pub use transactions::TransactionLog;

// Re-export the data types callers need alongside the coordinator
pub use tiercache_core::{
    CacheConfig, CacheError, CacheEvent, CacheResult, CacheStatistics, CacheStrategy,
    EntityId, GetOptions, InvalidateRequest, KeyMatcher, PatternRule, RefreshStrategy,
    SetOptions, TierDescriptor, TierKind, TransactionOp, TransactionStatus,
};
pub use tiercache_storage::Tier;
