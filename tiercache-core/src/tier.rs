//! Tier descriptors and per-tier statistics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ConfigError;

/// Kind of storage behind a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// In-process map with LRU bookkeeping
    Memory,
    /// Remote cache (network round-trips)
    Remote,
    /// Local persistent store
    Disk,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Memory => "memory",
            TierKind::Remote => "remote",
            TierKind::Disk => "disk",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TierKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(TierKind::Memory),
            "remote" => Ok(TierKind::Remote),
            "disk" => Ok(TierKind::Disk),
            _ => Err(ConfigError::InvalidValue {
                field: "tier.kind".to_string(),
                value: s.to_string(),
                reason: "expected memory, remote or disk".to_string(),
            }),
        }
    }
}

/// Static description of one tier.
///
/// Lower `priority` numbers are checked first on reads and are the targets
/// of promotion. Priorities need not be contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDescriptor {
    pub name: String,
    pub kind: TierKind,
    pub priority: u32,
    /// Capacity bound in bytes.
    pub capacity: u64,
    /// Tier-local default TTL, used when a write carries no explicit TTL.
    #[serde(with = "crate::duration_ms::option", default)]
    pub default_ttl: Option<Duration>,
    /// Location for tiers backed by a real on-disk store.
    #[serde(default)]
    pub location: Option<PathBuf>,
}

impl TierDescriptor {
    pub fn new(name: impl Into<String>, kind: TierKind, priority: u32, capacity: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            priority,
            capacity,
            default_ttl: None,
            location: None,
        }
    }

    /// Builder: set the tier-local default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Builder: set the on-disk location.
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn is_memory(&self) -> bool {
        self.kind == TierKind::Memory
    }
}

/// Point-in-time usage of a single tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    /// Stored bytes (post-transform payload sizes).
    pub size_bytes: u64,
    /// Resident entries.
    pub entry_count: u64,
    /// Entries removed to make room since the tier was built. Not reset by
    /// `clear`.
    pub evictions: u64,
}
