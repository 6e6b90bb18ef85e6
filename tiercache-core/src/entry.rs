//! Cache entries and their metadata.

use crate::{add_duration, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Bookkeeping stored alongside every cached payload.
///
/// `size` always reflects the stored (post-compression, post-encryption)
/// payload, and `expires_at == created_at + ttl` whenever `ttl` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub created_at: Timestamp,
    pub last_accessed: Timestamp,
    pub last_modified: Timestamp,
    pub hits: u64,
    pub size: usize,
    #[serde(with = "crate::duration_ms::option", default)]
    pub ttl: Option<Duration>,
    pub expires_at: Option<Timestamp>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub version: u64,
    /// Payload was compressed before storage.
    #[serde(default)]
    pub compressed: bool,
    /// Payload was encrypted before storage (after compression).
    #[serde(default)]
    pub encrypted: bool,
}

impl EntryMetadata {
    /// Fresh metadata for a payload of `size` bytes created at `now`.
    pub fn new(now: Timestamp, size: usize, ttl: Option<Duration>) -> Self {
        Self {
            created_at: now,
            last_accessed: now,
            last_modified: now,
            hits: 0,
            size,
            ttl,
            expires_at: ttl.map(|ttl| add_duration(now, ttl)),
            tags: BTreeSet::new(),
            dependencies: Vec::new(),
            version: 1,
            compressed: false,
            encrypted: false,
        }
    }

    /// Whether the entry is past its expiry at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// Whether the entry carries any of the given tags.
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag))
    }

    /// Remaining lifetime, if the entry expires and has not yet expired.
    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        let expires_at = self.expires_at?;
        if now >= expires_at {
            None
        } else {
            (expires_at - now).to_std().ok()
        }
    }
}

/// A single cached value as stored in a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Stored payload, possibly compressed and/or encrypted.
    pub value: Vec<u8>,
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Build an entry whose size is derived from the stored payload.
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let size = value.len();
        Self {
            key: key.into(),
            value,
            metadata: EntryMetadata::new(Utc::now(), size, ttl),
        }
    }

    /// Builder: attach tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: attach dependency keys.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.metadata.dependencies = dependencies;
        self
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.metadata.is_expired(now)
    }

    /// Record a read access.
    pub fn touch(&mut self, now: Timestamp) {
        self.metadata.last_accessed = now;
        self.metadata.hits += 1;
    }
}
