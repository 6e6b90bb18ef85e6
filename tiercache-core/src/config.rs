//! Configuration types
//!
//! Configuration is layered: `CacheConfig::default()` carries every default,
//! TOML documents and `TIERCACHE_*` environment variables override individual
//! fields. Durations are expressed in milliseconds on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{CacheResult, ConfigError, TierDescriptor, TierKind};

// ============================================================================
// DEFAULTS
// ============================================================================

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
pub const DEFAULT_PERSISTENCE_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);
pub const ENCRYPTION_KEY_SIZE: usize = 32;

// ============================================================================
// ENUMS
// ============================================================================

/// Which tiers receive a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Only the lowest-priority-number tier.
    SingleTier,
    /// Every tier.
    #[default]
    MultiTier,
    /// One shard tier chosen from the key, plus replicas.
    Distributed,
    /// One memory tier and one non-memory tier.
    Hybrid,
}

impl CacheStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::SingleTier => "single-tier",
            CacheStrategy::MultiTier => "multi-tier",
            CacheStrategy::Distributed => "distributed",
            CacheStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CacheStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "single-tier" | "single" => Ok(CacheStrategy::SingleTier),
            "multi-tier" | "multi" => Ok(CacheStrategy::MultiTier),
            "distributed" => Ok(CacheStrategy::Distributed),
            "hybrid" => Ok(CacheStrategy::Hybrid),
            _ => Err(invalid("strategy", s, "unknown strategy")),
        }
    }
}

/// Eviction policy used by memory tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicyKind {
    #[default]
    Lru,
    Lfu,
    Fifo,
}

impl FromStr for EvictionPolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lru" => Ok(EvictionPolicyKind::Lru),
            "lfu" => Ok(EvictionPolicyKind::Lfu),
            "fifo" => Ok(EvictionPolicyKind::Fifo),
            _ => Err(invalid("eviction_policy", s, "expected lru, lfu or fifo")),
        }
    }
}

/// Shard selection for the distributed strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShardingMode {
    /// Hash of the key modulo tier count.
    #[default]
    HashMod,
    /// Accepted but not implemented: always resolves to the first tier.
    ConsistentHash,
}

/// Declared consistency level. Recorded and reported, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    Strong,
    #[default]
    Eventual,
    Weak,
}

/// Format label passed to the persistence hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceFormat {
    #[default]
    Json,
    Binary,
}

// ============================================================================
// NESTED SECTIONS
// ============================================================================

/// Clustering settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub enabled: bool,
    pub nodes: Vec<String>,
    pub replication_factor: usize,
    pub sharding: ShardingMode,
    pub consistency: ConsistencyLevel,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            nodes: Vec::new(),
            replication_factor: 1,
            sharding: ShardingMode::HashMod,
            consistency: ConsistencyLevel::Eventual,
        }
    }
}

/// Periodic persistence hook settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    #[serde(with = "crate::duration_ms")]
    pub interval: Duration,
    pub location: Option<PathBuf>,
    pub format: PersistenceFormat,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_PERSISTENCE_INTERVAL,
            location: None,
            format: PersistenceFormat::Json,
        }
    }
}

/// Periodic metrics emission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    #[serde(with = "crate::duration_ms")]
    pub interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_METRICS_INTERVAL,
        }
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration for a cache coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub strategy: CacheStrategy,
    pub tiers: Vec<TierDescriptor>,
    #[serde(with = "crate::duration_ms")]
    pub default_ttl: Duration,
    /// Upper bound in bytes for memory-kind tiers.
    pub max_size: u64,
    pub eviction_policy: EvictionPolicyKind,
    pub compression: bool,
    /// Payloads below this many bytes are stored uncompressed.
    pub compression_threshold: usize,
    pub compression_level: u32,
    pub encryption: bool,
    /// Hex-encoded 256-bit key. When absent a random key is generated per process.
    #[serde(skip_serializing)]
    pub encryption_key: Option<String>,
    pub clustering: ClusteringConfig,
    pub persistence: PersistenceConfig,
    pub metrics: MetricsConfig,
    /// Buffer size of the event channel.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::MultiTier,
            tiers: Self::default_tiers(),
            default_ttl: DEFAULT_TTL,
            max_size: DEFAULT_MAX_SIZE,
            eviction_policy: EvictionPolicyKind::Lru,
            compression: true,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            encryption: false,
            encryption_key: None,
            clustering: ClusteringConfig::default(),
            persistence: PersistenceConfig::default(),
            metrics: MetricsConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory (60s), remote (1h) and disk (24h) tiers with increasing
    /// priority number and capacity.
    pub fn default_tiers() -> Vec<TierDescriptor> {
        vec![
            TierDescriptor::new("memory", TierKind::Memory, 1, DEFAULT_MAX_SIZE)
                .with_default_ttl(Duration::from_secs(60)),
            TierDescriptor::new("remote", TierKind::Remote, 2, 10 * DEFAULT_MAX_SIZE)
                .with_default_ttl(Duration::from_secs(3600)),
            TierDescriptor::new("disk", TierKind::Disk, 3, 100 * DEFAULT_MAX_SIZE)
                .with_default_ttl(Duration::from_secs(86_400)),
        ]
    }

    // ========================================================================
    // Builders
    // ========================================================================

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_tiers(mut self, tiers: Vec<TierDescriptor>) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicyKind) -> Self {
        self.eviction_policy = policy;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }

    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.encryption = enabled;
        self
    }

    pub fn with_encryption_key(mut self, hex_key: impl Into<String>) -> Self {
        self.encryption_key = Some(hex_key.into());
        self
    }

    pub fn with_clustering(mut self, clustering: ClusteringConfig) -> Self {
        self.clustering = clustering;
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }

    // ========================================================================
    // Sources
    // ========================================================================

    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(source: &str) -> CacheResult<Self> {
        let config: CacheConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Create a config from environment variables layered over the defaults.
    ///
    /// # Environment Variables
    /// - `TIERCACHE_STRATEGY`: single-tier, multi-tier, distributed, hybrid
    /// - `TIERCACHE_DEFAULT_TTL_MS`: default TTL (default: 3600000)
    /// - `TIERCACHE_MAX_SIZE_BYTES`: memory tier bound (default: 104857600)
    /// - `TIERCACHE_EVICTION_POLICY`: lru, lfu, fifo
    /// - `TIERCACHE_COMPRESSION`: "true" or "false" (default: true)
    /// - `TIERCACHE_ENCRYPTION`: "true" or "false" (default: false)
    /// - `TIERCACHE_ENCRYPTION_KEY`: 64 hex characters
    /// - `TIERCACHE_REPLICATION_FACTOR`: replicas for the distributed strategy (default: 1)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(strategy) = env_parse("TIERCACHE_STRATEGY") {
            config.strategy = strategy;
        }
        if let Some(ms) = env_parse::<u64>("TIERCACHE_DEFAULT_TTL_MS") {
            config.default_ttl = Duration::from_millis(ms);
        }
        if let Some(max_size) = env_parse("TIERCACHE_MAX_SIZE_BYTES") {
            config.max_size = max_size;
        }
        if let Some(policy) = env_parse("TIERCACHE_EVICTION_POLICY") {
            config.eviction_policy = policy;
        }
        if let Some(enabled) = env_flag("TIERCACHE_COMPRESSION") {
            config.compression = enabled;
        }
        if let Some(enabled) = env_flag("TIERCACHE_ENCRYPTION") {
            config.encryption = enabled;
        }
        if let Ok(key) = std::env::var("TIERCACHE_ENCRYPTION_KEY") {
            if !key.trim().is_empty() {
                config.encryption_key = Some(key.trim().to_string());
            }
        }
        if let Some(factor) = env_parse("TIERCACHE_REPLICATION_FACTOR") {
            config.clustering.replication_factor = factor;
        }

        config
    }

    // ========================================================================
    // Derived values
    // ========================================================================

    /// Effective byte capacity of a tier after applying `max_size` to memory tiers.
    pub fn effective_capacity(&self, tier: &TierDescriptor) -> u64 {
        if tier.is_memory() {
            tier.capacity.min(self.max_size)
        } else {
            tier.capacity
        }
    }

    /// Decode the externalized encryption key, if one is configured.
    pub fn encryption_key_bytes(&self) -> CacheResult<Option<[u8; ENCRYPTION_KEY_SIZE]>> {
        let Some(hex_key) = self.encryption_key.as_deref() else {
            return Ok(None);
        };
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| invalid("encryption_key", "<redacted>", &e.to_string()))?;
        if bytes.len() != ENCRYPTION_KEY_SIZE {
            return Err(invalid(
                "encryption_key",
                "<redacted>",
                &format!("key must be {} bytes, got {}", ENCRYPTION_KEY_SIZE, bytes.len()),
            )
            .into());
        }
        let mut key = [0u8; ENCRYPTION_KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Some(key))
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Validate the configuration.
    pub fn validate(&self) -> CacheResult<()> {
        if self.tiers.is_empty() {
            return Err(invalid("tiers", "[]", "at least one tier is required").into());
        }

        let mut names = std::collections::HashSet::new();
        for tier in &self.tiers {
            if tier.name.trim().is_empty() {
                return Err(invalid("tiers.name", "", "tier names must be non-empty").into());
            }
            if !names.insert(tier.name.as_str()) {
                return Err(invalid("tiers.name", &tier.name, "tier names must be unique").into());
            }
            if tier.capacity == 0 {
                return Err(invalid(
                    "tiers.capacity",
                    &tier.name,
                    "capacity must be greater than 0",
                )
                .into());
            }
        }

        if self.default_ttl.is_zero() {
            return Err(invalid("default_ttl", "0", "default_ttl must be greater than 0").into());
        }

        if self.max_size == 0 {
            return Err(invalid("max_size", "0", "max_size must be greater than 0").into());
        }

        if self.compression_level > 9 {
            return Err(invalid(
                "compression_level",
                &self.compression_level.to_string(),
                "compression_level must be between 0 and 9",
            )
            .into());
        }

        let replication = self.clustering.replication_factor;
        if replication == 0 || replication > self.tiers.len() {
            return Err(invalid(
                "clustering.replication_factor",
                &replication.to_string(),
                "replication_factor must be between 1 and the number of tiers",
            )
            .into());
        }

        if self.persistence.enabled && self.persistence.interval.is_zero() {
            return Err(invalid(
                "persistence.interval",
                "0",
                "interval must be greater than 0 when persistence is enabled",
            )
            .into());
        }

        if self.metrics.enabled && self.metrics.interval.is_zero() {
            return Err(invalid(
                "metrics.interval",
                "0",
                "interval must be greater than 0 when metrics are enabled",
            )
            .into());
        }

        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", "0", "event_capacity must be greater than 0").into());
        }

        self.encryption_key_bytes()?;

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheError;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.strategy, CacheStrategy::MultiTier);
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
        assert_eq!(config.max_size, 100 * 1024 * 1024);
        assert_eq!(config.eviction_policy, EvictionPolicyKind::Lru);
        assert!(config.compression);
        assert!(!config.encryption);
        assert_eq!(config.tiers.len(), 3);

        let priorities: Vec<u32> = config.tiers.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3]);
        assert!(config.tiers[0].capacity < config.tiers[1].capacity);
        assert!(config.tiers[1].capacity < config.tiers[2].capacity);
        assert_eq!(config.tiers[0].default_ttl, Some(Duration::from_secs(60)));
        assert_eq!(config.tiers[2].default_ttl, Some(Duration::from_secs(86_400)));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicate_tiers() {
        let config = CacheConfig::default().with_tiers(vec![
            TierDescriptor::new("a", TierKind::Memory, 1, 10),
            TierDescriptor::new("a", TierKind::Disk, 2, 10),
        ]);
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_tiers_and_zero_ttl() {
        assert!(CacheConfig::default().with_tiers(vec![]).validate().is_err());
        assert!(CacheConfig::default()
            .with_default_ttl(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_replication_bounds() {
        let mut config = CacheConfig::default();
        config.clustering.replication_factor = 4;
        assert!(config.validate().is_err());
        config.clustering.replication_factor = 3;
        assert!(config.validate().is_ok());
        config.clustering.replication_factor = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_encryption_key_parsing() {
        let key = "00".repeat(32);
        let config = CacheConfig::default().with_encryption_key(key);
        assert_eq!(config.encryption_key_bytes().unwrap(), Some([0u8; 32]));

        let short = CacheConfig::default().with_encryption_key("abcd");
        assert!(short.encryption_key_bytes().is_err());
        assert!(short.validate().is_err());

        let garbage = CacheConfig::default().with_encryption_key("zz".repeat(32));
        assert!(garbage.encryption_key_bytes().is_err());
    }

    #[test]
    fn test_effective_capacity_caps_memory_tiers() {
        let config = CacheConfig::default().with_max_size(4096);
        assert_eq!(config.effective_capacity(&config.tiers[0]), 4096);
        assert_eq!(
            config.effective_capacity(&config.tiers[1]),
            config.tiers[1].capacity
        );
    }

    #[test]
    fn test_from_toml_partial_document() {
        let config = CacheConfig::from_toml_str(
            r#"
            strategy = "hybrid"
            default_ttl = 5000
            compression = false

            [clustering]
            replication_factor = 2
            sharding = "consistent-hash"
            consistency = "strong"

            [[tiers]]
            name = "l1"
            kind = "memory"
            priority = 1
            capacity = 2048
            default_ttl = 1000

            [[tiers]]
            name = "l2"
            kind = "disk"
            priority = 5
            capacity = 1048576
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, CacheStrategy::Hybrid);
        assert_eq!(config.default_ttl, Duration::from_millis(5000));
        assert!(!config.compression);
        assert_eq!(config.clustering.replication_factor, 2);
        assert_eq!(config.clustering.sharding, ShardingMode::ConsistentHash);
        assert_eq!(config.clustering.consistency, ConsistencyLevel::Strong);
        assert_eq!(config.tiers.len(), 2);
        assert_eq!(config.tiers[0].default_ttl, Some(Duration::from_millis(1000)));
        assert_eq!(config.tiers[1].default_ttl, None);
        // Untouched fields keep defaults
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
    }

    #[test]
    fn test_from_toml_rejects_bad_documents() {
        assert!(matches!(
            CacheConfig::from_toml_str("strategy = 3"),
            Err(CacheError::Config(ConfigError::Parse { .. }))
        ));
        assert!(CacheConfig::from_toml_str("tiers = []").is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let err = CacheConfig::from_file("/nonexistent/tiercache.toml").unwrap_err();
        assert!(matches!(err, CacheError::Config(ConfigError::Io { .. })));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("TIERCACHE_STRATEGY", "distributed");
        std::env::set_var("TIERCACHE_DEFAULT_TTL_MS", "2500");
        std::env::set_var("TIERCACHE_COMPRESSION", "false");
        std::env::set_var("TIERCACHE_REPLICATION_FACTOR", "not-a-number");

        let config = CacheConfig::from_env();

        std::env::remove_var("TIERCACHE_STRATEGY");
        std::env::remove_var("TIERCACHE_DEFAULT_TTL_MS");
        std::env::remove_var("TIERCACHE_COMPRESSION");
        std::env::remove_var("TIERCACHE_REPLICATION_FACTOR");

        assert_eq!(config.strategy, CacheStrategy::Distributed);
        assert_eq!(config.default_ttl, Duration::from_millis(2500));
        assert!(!config.compression);
        assert_eq!(config.clustering.replication_factor, 1);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "single_tier".parse::<CacheStrategy>().unwrap(),
            CacheStrategy::SingleTier
        );
        assert_eq!(CacheStrategy::Hybrid.to_string(), "hybrid");
        assert!("sideways".parse::<CacheStrategy>().is_err());
    }

    #[test]
    fn test_encryption_key_not_serialized() {
        let config = CacheConfig::default().with_encryption_key("11".repeat(32));
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("encryption_key").is_none());
    }
}
