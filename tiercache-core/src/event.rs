//! Cache Event Types
//!
//! Every side effect of the coordinator is announced as a `CacheEvent` on its
//! outbound channel. Events are informational; dropping them never affects
//! cache state.

use crate::{CacheStatistics, EntityId, PersistenceFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which selector an invalidation used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationScope {
    All,
    Keys,
    Tags,
    Pattern,
}

/// Observability events emitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheEvent {
    // ========================================================================
    // DATA EVENTS
    // ========================================================================
    /// A value was written.
    Set {
        key: String,
        /// Tiers that received the write.
        tiers: Vec<String>,
        size: usize,
    },

    /// Keys were deleted.
    Delete { keys: Vec<String> },

    /// An invalidation completed.
    Invalidate {
        scope: InvalidationScope,
        count: u64,
    },

    /// A write was copied to replica tiers.
    Replicate { key: String, tiers: Vec<String> },

    /// Bulk warm-up completed.
    Warmup { count: u64 },

    /// A key should be refreshed by the caller.
    Refresh {
        key: String,
        /// Pattern rule that triggered the refresh, if any.
        pattern: Option<String>,
    },

    // ========================================================================
    // LIFECYCLE EVENTS
    // ========================================================================
    /// Periodic persistence hook.
    Persist {
        location: Option<PathBuf>,
        format: PersistenceFormat,
        entries: u64,
    },

    /// Periodic metrics snapshot.
    Metrics { statistics: CacheStatistics },

    TransactionCommitted { id: EntityId, operations: usize },

    TransactionRolledBack {
        id: EntityId,
        reason: Option<String>,
    },

    /// A caller-visible operation failed.
    Error {
        operation: String,
        key: Option<String>,
        message: String,
    },
}

impl CacheEvent {
    /// Stable event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Set { .. } => "set",
            CacheEvent::Delete { .. } => "delete",
            CacheEvent::Invalidate { .. } => "invalidate",
            CacheEvent::Replicate { .. } => "replicate",
            CacheEvent::Warmup { .. } => "warmup",
            CacheEvent::Refresh { .. } => "refresh",
            CacheEvent::Persist { .. } => "persist",
            CacheEvent::Metrics { .. } => "metrics",
            CacheEvent::TransactionCommitted { .. } => "transaction:committed",
            CacheEvent::TransactionRolledBack { .. } => "transaction:rolled-back",
            CacheEvent::Error { .. } => "error",
        }
    }
}
