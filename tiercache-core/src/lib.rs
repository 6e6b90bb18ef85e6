//! tiercache Core - Data Types
//!
//! Pure data structures shared by the storage tiers and the coordinator.
//! This crate contains no I/O and no scheduling.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod config;
pub mod entry;
pub mod error;
pub mod event;
pub mod lock;
pub mod options;
pub mod pattern;
pub mod stats;
pub mod tier;
pub mod transaction;

pub use config::{
    CacheConfig, CacheStrategy, ClusteringConfig, ConsistencyLevel, EvictionPolicyKind,
    MetricsConfig, PersistenceConfig, PersistenceFormat, ShardingMode,
};
pub use entry::{CacheEntry, EntryMetadata};
pub use error::{
    CacheError, CacheResult, CodecError, ConfigError, LockError, TierError, TransactionError,
};
pub use event::{CacheEvent, InvalidationScope};
pub use lock::AdvisoryLock;
pub use options::{GetOptions, InvalidateRequest, KeyMatcher, SetOptions};
pub use pattern::{PatternRule, RefreshStrategy};
pub use stats::CacheStatistics;
pub use tier::{TierDescriptor, TierKind, TierStats};
pub use transaction::{Transaction, TransactionOp, TransactionStatus};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Identifier for locks and transactions (UUIDv7, timestamp-sortable).
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 identifier.
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Add a std duration to a timestamp, saturating at the far future.
pub fn add_duration(at: Timestamp, duration: std::time::Duration) -> Timestamp {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

/// (De)serialize a `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    /// Same encoding for `Option<Duration>`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
        }
    }
}
