//! Cache coordinator.
//!
//! Owns the tier set and every collaborator (locks, transactions, pattern
//! registry, dependency index, codec, statistics, scheduler, event bus).
//!
//! # Read path
//!
//! Tiers are scanned in ascending priority number. Expired entries are
//! deleted from the tier they were found in and the scan continues. The first
//! live hit is copied into every tier with a strictly lower priority number.
//! Any tier or codec failure is logged and treated as a miss.
//!
//! # Write path
//!
//! Values are compressed then encrypted once, and an entry is built per target
//! tier so each tier can apply its own default TTL. Target tiers come from the
//! configured strategy unless the caller names one. Failures are logged,
//! announced as an error event, and returned.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tiercache_core::{
    new_entity_id, AdvisoryLock, CacheConfig, CacheEntry, CacheError, CacheEvent, CacheResult,
    CacheStatistics, CacheStrategy, ClusteringConfig, EntityId, EntryMetadata,
    EvictionPolicyKind, GetOptions, InvalidateRequest, InvalidationScope, KeyMatcher,
    PatternRule, PersistenceConfig, RefreshStrategy, SetOptions, TierDescriptor, TierError, TierStats,
    Timestamp, TransactionOp, TransactionStatus,
};
use tiercache_storage::{build_tier, Tier};
use tokio::sync::broadcast;

use crate::codec::ValueCodec;
use crate::dependencies::DependencyIndex;
use crate::events::EventBus;
use crate::locks::LockManager;
use crate::patterns::PatternRegistry;
use crate::scheduler::{Scheduler, TaskId};
use crate::sharding::{replica_indices, shard_index};
use crate::stats::StatsRecorder;
use crate::transactions::TransactionLog;

type TierList = Arc<[Arc<dyn Tier>]>;
type RefreshTimers = Arc<Mutex<HashMap<String, (EntityId, TaskId)>>>;

// ============================================================================
// INFO TYPES
// ============================================================================

/// One tier in a [`CacheInfo`] report.
#[derive(Debug, Clone, Serialize)]
pub struct TierInfo {
    pub descriptor: TierDescriptor,
    /// `None` when the tier could not report usage.
    pub stats: Option<TierStats>,
}

/// Descriptive snapshot of a running coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub strategy: CacheStrategy,
    pub tiers: Vec<TierInfo>,
    pub patterns: usize,
    pub live_locks: usize,
    pub pending_transactions: usize,
    /// Keys with at least one registered dependent.
    pub dependency_keys: usize,
    pub subscribers: usize,
    pub scheduled_tasks: usize,
    pub compression: bool,
    pub encryption: bool,
    pub eviction_policy: EvictionPolicyKind,
    /// Declared clustering settings. Consistency is not enforced.
    pub clustering: ClusteringConfig,
    #[serde(with = "tiercache_core::duration_ms")]
    pub uptime: Duration,
}

/// Tiers selected for one write.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WriteTargets {
    primary: Vec<usize>,
    replicas: Vec<usize>,
}

impl WriteTargets {
    fn single(index: usize) -> Self {
        Self {
            primary: vec![index],
            replicas: Vec::new(),
        }
    }

    fn all(&self) -> impl Iterator<Item = usize> + '_ {
        self.primary.iter().chain(self.replicas.iter()).copied()
    }
}

/// Keys removed by a bulk delete.
#[derive(Debug, Default)]
struct Removal {
    /// (tier, key) deletions.
    tier_deletions: u64,
    /// Keys that were resident in at least one tier.
    keys: Vec<String>,
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Multi-tier cache front end.
///
/// # Example
///
/// ```ignore
/// use tiercache_core::{CacheConfig, GetOptions, SetOptions};
/// use tiercache_engine::CacheCoordinator;
///
/// let cache = CacheCoordinator::new(CacheConfig::default()).await?;
/// cache.set("user:1", b"alice", SetOptions::new()).await?;
/// let value = cache.get("user:1", GetOptions::new()).await;
/// cache.shutdown().await;
/// ```
pub struct CacheCoordinator {
    config: CacheConfig,
    tiers: TierList,
    codec: ValueCodec,
    scheduler: Scheduler,
    locks: LockManager,
    transactions: TransactionLog,
    patterns: PatternRegistry,
    dependencies: DependencyIndex,
    stats: Arc<StatsRecorder>,
    events: EventBus,
    refresh_timers: RefreshTimers,
    started_at: Instant,
    shut_down: AtomicBool,
}

impl CacheCoordinator {
    /// Validate `config`, build its tiers and start background tasks.
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let mut tiers = Vec::with_capacity(config.tiers.len());
        for descriptor in &config.tiers {
            tiers.push(build_tier(descriptor, &config)?);
        }
        Self::with_tiers(config, tiers).await
    }

    /// Use caller-built tiers. Their descriptors replace `config.tiers`.
    pub async fn with_tiers(
        mut config: CacheConfig,
        mut tiers: Vec<Arc<dyn Tier>>,
    ) -> CacheResult<Self> {
        tiers.sort_by_key(|tier| tier.descriptor().priority);
        config.tiers = tiers.iter().map(|tier| tier.descriptor().clone()).collect();
        config.validate()?;

        let codec = ValueCodec::from_config(&config)?;
        let scheduler = Scheduler::new();

        let coordinator = Self {
            locks: LockManager::new(scheduler.clone()),
            transactions: TransactionLog::new(),
            patterns: PatternRegistry::new(),
            dependencies: DependencyIndex::new(),
            stats: Arc::new(StatsRecorder::new()),
            events: EventBus::new(config.event_capacity),
            refresh_timers: Arc::new(Mutex::new(HashMap::new())),
            started_at: Instant::now(),
            shut_down: AtomicBool::new(false),
            tiers: Arc::from(tiers),
            codec,
            scheduler,
            config,
        };

        coordinator.start_background_tasks();

        tracing::info!(
            strategy = %coordinator.config.strategy,
            tiers = coordinator.tiers.len(),
            compression = coordinator.codec.compression_enabled(),
            encryption = coordinator.codec.encryption_enabled(),
            "Cache coordinator started"
        );

        Ok(coordinator)
    }

    fn start_background_tasks(&self) {
        let persistence = &self.config.persistence;
        if persistence.enabled {
            let tiers = Arc::clone(&self.tiers);
            let events = self.events.clone();
            let hook = persistence.clone();
            self.scheduler
                .schedule_every("persist", persistence.interval, move || {
                    let tiers = Arc::clone(&tiers);
                    let events = events.clone();
                    let hook = hook.clone();
                    async move {
                        emit_persist(&tiers, &events, &hook).await;
                    }
                });
        }

        let metrics = &self.config.metrics;
        if metrics.enabled {
            let tiers = Arc::clone(&self.tiers);
            let events = self.events.clone();
            let stats = Arc::clone(&self.stats);
            self.scheduler
                .schedule_every("metrics", metrics.interval, move || {
                    let tiers = Arc::clone(&tiers);
                    let events = events.clone();
                    let stats = Arc::clone(&stats);
                    async move {
                        let statistics = collect_statistics(&tiers, &stats).await;
                        events.emit(CacheEvent::Metrics { statistics });
                    }
                });
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Subscribe to side-effect events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Tier names in read order.
    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|tier| tier.name().to_string()).collect()
    }

    pub fn tier(&self, name: &str) -> Option<Arc<dyn Tier>> {
        self.tier_index(name).map(|index| Arc::clone(&self.tiers[index]))
    }

    fn tier_index(&self, name: &str) -> Option<usize> {
        self.tiers.iter().position(|tier| tier.name() == name)
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Read a value. Never fails: any trouble is logged and reported as a miss.
    pub async fn get(&self, key: &str, options: GetOptions) -> Option<Vec<u8>> {
        let started = Instant::now();
        let now = Utc::now();

        let found = match options.tier.as_deref() {
            Some(name) => match self.tier_index(name) {
                Some(index) => self
                    .read_live(index, key, now)
                    .await
                    .map(|entry| (index, entry)),
                None => {
                    tracing::warn!(tier = %name, key = %key, "Read from unknown tier");
                    None
                }
            },
            None => self.scan(key, now).await,
        };

        let value = match found {
            Some((index, mut entry)) => {
                if options.tier.is_none() {
                    self.promote(index, &entry).await;
                }

                if options.touch {
                    entry.touch(now);
                    let tier = &self.tiers[index];
                    if let Err(e) = tier.set(entry.clone()).await {
                        tracing::warn!(tier = %tier.name(), key = %key, error = %e, "Failed to rewrite touched entry");
                    }
                }

                match self.codec.decode(
                    &entry.value,
                    entry.metadata.compressed,
                    entry.metadata.encrypted,
                ) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Failed to decode cached value, treating as miss");
                        None
                    }
                }
            }
            None => None,
        };

        match value {
            Some(_) => self.stats.record_hit(started.elapsed()),
            None => {
                self.stats.record_miss(started.elapsed());
                if options.refresh {
                    let pattern = self.patterns.find(key).map(|rule| rule.name);
                    self.events.emit(CacheEvent::Refresh {
                        key: key.to_string(),
                        pattern,
                    });
                }
            }
        }

        value
    }

    /// Read a JSON value written by [`Self::set_json`].
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
        options: GetOptions,
    ) -> CacheResult<Option<T>> {
        match self.get(key, options).await {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CacheError::serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn scan(&self, key: &str, now: Timestamp) -> Option<(usize, CacheEntry)> {
        for index in 0..self.tiers.len() {
            if let Some(entry) = self.read_live(index, key, now).await {
                return Some((index, entry));
            }
        }
        None
    }

    /// Read one tier, deleting the entry there if it has expired.
    async fn read_live(
        &self,
        index: usize,
        key: &str,
        now: Timestamp,
    ) -> Option<CacheEntry> {
        let tier = &self.tiers[index];
        match tier.get(key).await {
            Ok(Some(entry)) if entry.is_expired(now) => {
                if let Err(e) = tier.delete(key).await {
                    tracing::warn!(tier = %tier.name(), key = %key, error = %e, "Failed to remove expired entry");
                }
                tracing::debug!(tier = %tier.name(), key = %key, "Expired entry removed on read");
                None
            }
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(tier = %tier.name(), key = %key, error = %e, "Tier read failed, treating as miss");
                None
            }
        }
    }

    /// Copy a hit into every tier with a strictly lower priority number.
    async fn promote(&self, index: usize, entry: &CacheEntry) {
        let source_priority = self.tiers[index].descriptor().priority;
        for tier in self.tiers[..index]
            .iter()
            .filter(|tier| tier.descriptor().priority < source_priority)
        {
            match tier.set(entry.clone()).await {
                Ok(()) => {
                    tracing::debug!(tier = %tier.name(), key = %entry.key, "Promoted entry");
                }
                Err(e) => {
                    tracing::warn!(tier = %tier.name(), key = %entry.key, error = %e, "Promotion failed");
                }
            }
        }
    }

    /// Whether any tier holds a live entry for `key`.
    async fn has_live(&self, key: &str) -> bool {
        let now = Utc::now();
        for tier in self.tiers.iter() {
            if let Ok(Some(entry)) = tier.get(key).await {
                if !entry.is_expired(now) {
                    return true;
                }
            }
        }
        false
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Write a value.
    pub async fn set(&self, key: &str, value: &[u8], options: SetOptions) -> CacheResult<()> {
        match self.write(key, value, &options).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache write failed");
                self.emit_error("set", Some(key), &e);
                Err(e)
            }
        }
    }

    /// Serialize `value` as JSON and write it.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> CacheResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::serialization(e.to_string()))?;
        self.set(key, &bytes, options).await
    }

    async fn write(&self, key: &str, value: &[u8], options: &SetOptions) -> CacheResult<()> {
        if !options.overwrite && self.has_live(key).await {
            tracing::debug!(key = %key, "Live value present and overwrite disabled, skipping write");
            return Ok(());
        }

        let targets = self.write_targets(key, options.tier.as_deref())?;
        let rule = self.patterns.find(key);
        let encoded = self.codec.encode(value)?;
        let now = Utc::now();

        let mut tags: BTreeSet<String> = options.tags.iter().cloned().collect();
        if let Some(rule) = &rule {
            tags.extend(rule.tags.iter().cloned());
        }

        let mut written = Vec::new();
        let mut earliest_expiry: Option<Timestamp> = None;
        for index in targets.all() {
            let tier = &self.tiers[index];
            let ttl = options
                .ttl
                .or_else(|| rule.as_ref().and_then(|rule| rule.ttl))
                .or(tier.descriptor().default_ttl)
                .unwrap_or(self.config.default_ttl);

            let mut metadata = EntryMetadata::new(now, encoded.bytes.len(), Some(ttl));
            metadata.tags = tags.clone();
            metadata.dependencies = options.dependencies.clone();
            metadata.compressed = encoded.compressed;
            metadata.encrypted = encoded.encrypted;

            earliest_expiry = match (earliest_expiry, metadata.expires_at) {
                (Some(earliest), Some(expires_at)) => Some(earliest.min(expires_at)),
                (earliest, expires_at) => earliest.or(expires_at),
            };

            tier.set(CacheEntry {
                key: key.to_string(),
                value: encoded.bytes.clone(),
                metadata,
            })
            .await?;
            written.push(tier.name().to_string());
        }

        self.stats.record_write();
        self.dependencies.register(key, &options.dependencies);

        tracing::debug!(key = %key, tiers = ?written, size = encoded.bytes.len(), "Cached value");
        self.events.emit(CacheEvent::Set {
            key: key.to_string(),
            tiers: written,
            size: encoded.bytes.len(),
        });

        if !targets.replicas.is_empty() {
            let replicas = targets
                .replicas
                .iter()
                .map(|&index| self.tiers[index].name().to_string())
                .collect();
            self.events.emit(CacheEvent::Replicate {
                key: key.to_string(),
                tiers: replicas,
            });
        }

        self.cancel_refresh(key);
        if let (Some(rule), Some(expires_at)) = (&rule, earliest_expiry) {
            if rule.refresh == Some(RefreshStrategy::OnExpire) {
                let delay = RefreshStrategy::on_expire_delay(expires_at, now);
                self.arm_refresh(key, &rule.name, delay);
            }
        }

        Ok(())
    }

    fn write_targets(&self, key: &str, tier: Option<&str>) -> CacheResult<WriteTargets> {
        if let Some(name) = tier {
            let index = self.tier_index(name).ok_or_else(|| TierError::NotFound {
                name: name.to_string(),
            })?;
            return Ok(WriteTargets::single(index));
        }

        let count = self.tiers.len();
        let targets = match self.config.strategy {
            CacheStrategy::SingleTier => WriteTargets::single(0),
            CacheStrategy::MultiTier => WriteTargets {
                primary: (0..count).collect(),
                replicas: Vec::new(),
            },
            CacheStrategy::Distributed => {
                let clustering = &self.config.clustering;
                let shard = shard_index(key, count, clustering.sharding);
                WriteTargets {
                    primary: vec![shard],
                    replicas: replica_indices(shard, count, clustering.replication_factor),
                }
            }
            CacheStrategy::Hybrid => {
                let memory = self.tiers.iter().position(|t| t.descriptor().is_memory());
                let durable = self.tiers.iter().position(|t| !t.descriptor().is_memory());
                WriteTargets {
                    primary: memory.into_iter().chain(durable).collect(),
                    replicas: Vec::new(),
                }
            }
        };
        Ok(targets)
    }

    /// Write many values, skipping failures. Returns how many were written.
    pub async fn warm_up<I>(&self, items: I) -> u64
    where
        I: IntoIterator<Item = (String, Vec<u8>, SetOptions)>,
    {
        let mut count = 0u64;
        for (key, value, options) in items {
            match self.set(&key, &value, options).await {
                Ok(()) => count += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Warm-up entry skipped");
                }
            }
        }
        tracing::info!(count, "Cache warm-up completed");
        self.events.emit(CacheEvent::Warmup { count });
        count
    }

    // ========================================================================
    // Deletion and invalidation
    // ========================================================================

    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.delete_many(&[key.to_string()]).await
    }

    /// Delete keys from every tier, along with their locks and refresh timers.
    pub async fn delete_many(&self, keys: &[String]) -> CacheResult<()> {
        match self.remove_keys(keys).await {
            Ok(removal) => {
                self.stats.record_deletes(removal.keys.len() as u64);
                self.events.emit(CacheEvent::Delete {
                    keys: keys.to_vec(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(keys = ?keys, error = %e, "Cache delete failed");
                self.emit_error("delete", keys.first().map(String::as_str), &e);
                Err(e)
            }
        }
    }

    /// Remove entries selected by `request`. Returns the number of (tier, key)
    /// deletions, or entries cleared for `all`.
    ///
    /// Keys that registered a dependency on a removed key are deleted too.
    pub async fn invalidate(&self, request: InvalidateRequest) -> CacheResult<u64> {
        match self.invalidate_inner(&request).await {
            Ok(count) => Ok(count),
            Err(e) => {
                tracing::error!(error = %e, "Cache invalidation failed");
                self.emit_error("invalidate", None, &e);
                Err(e)
            }
        }
    }

    async fn invalidate_inner(&self, request: &InvalidateRequest) -> CacheResult<u64> {
        let (scope, count, removed) = if request.all {
            (InvalidationScope::All, self.clear_tiers().await?, Vec::new())
        } else if let Some(keys) = &request.keys {
            let removal = self.remove_keys(keys).await?;
            (InvalidationScope::Keys, removal.tier_deletions, keys.clone())
        } else if let Some(tags) = &request.tags {
            let removal = self
                .remove_matching(|tier| {
                    let tags = tags.clone();
                    async move { tier.keys_by_tag(&tags).await }
                })
                .await?;
            (InvalidationScope::Tags, removal.tier_deletions, removal.keys)
        } else if let Some(pattern) = &request.pattern {
            let removal = self
                .remove_matching(|tier| {
                    let pattern = pattern.clone();
                    async move {
                        tier.keys().await.map(|keys| {
                            keys.into_iter()
                                .filter(|key| pattern.is_match(key))
                                .collect::<Vec<_>>()
                        })
                    }
                })
                .await?;
            (InvalidationScope::Pattern, removal.tier_deletions, removal.keys)
        } else {
            tracing::debug!("Empty invalidation request");
            return Ok(0);
        };

        self.stats.record_deletes(count);

        let dependents = self.dependencies.take_dependents(&removed);
        if !dependents.is_empty() {
            let removal = self.remove_keys(&dependents).await?;
            self.stats.record_deletes(removal.keys.len() as u64);
            tracing::debug!(count = dependents.len(), "Removed dependent keys");
            self.events.emit(CacheEvent::Delete { keys: dependents });
        }

        tracing::debug!(scope = ?scope, count, "Invalidation completed");
        self.events.emit(CacheEvent::Invalidate { scope, count });
        Ok(count)
    }

    /// Delete `keys` from every tier. Every tier is attempted; the first
    /// failure is returned afterwards.
    async fn remove_keys(&self, keys: &[String]) -> CacheResult<Removal> {
        let mut removal = Removal::default();
        let mut first_error = None;

        for key in keys {
            let mut resident = false;
            for tier in self.tiers.iter() {
                match tier.delete(key).await {
                    Ok(true) => {
                        resident = true;
                        removal.tier_deletions += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(tier = %tier.name(), key = %key, error = %e, "Tier delete failed");
                        first_error.get_or_insert(e);
                    }
                }
            }
            self.locks.remove(key).await;
            self.cancel_refresh(key);
            if resident {
                removal.keys.push(key.clone());
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removal),
        }
    }

    /// Delete, tier by tier, the keys `select` picks from that tier.
    async fn remove_matching<F, Fut>(&self, select: F) -> CacheResult<Removal>
    where
        F: Fn(Arc<dyn Tier>) -> Fut,
        Fut: std::future::Future<Output = CacheResult<Vec<String>>>,
    {
        let mut removal = Removal::default();
        let mut removed = BTreeSet::new();

        for tier in self.tiers.iter() {
            for key in select(Arc::clone(tier)).await? {
                if tier.delete(&key).await? {
                    removal.tier_deletions += 1;
                    removed.insert(key);
                }
            }
        }

        for key in &removed {
            self.cancel_refresh(key);
        }
        removal.keys = removed.into_iter().collect();
        Ok(removal)
    }

    async fn clear_tiers(&self) -> CacheResult<u64> {
        let mut cleared = 0u64;
        let mut first_error = None;
        for tier in self.tiers.iter() {
            match tier.clear().await {
                Ok(count) => cleared += count,
                Err(e) => {
                    tracing::warn!(tier = %tier.name(), error = %e, "Tier clear failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.cancel_all_refresh();
        self.dependencies.clear();

        match first_error {
            Some(e) => Err(e),
            None => Ok(cleared),
        }
    }

    /// Empty every tier and reset statistics. Returns the entries removed.
    pub async fn clear(&self) -> CacheResult<u64> {
        let cleared = self.clear_tiers().await?;
        self.stats.reset(tier_evictions(&self.tiers).await);
        tracing::info!(cleared, "Cache cleared");
        Ok(cleared)
    }

    // ========================================================================
    // Locks
    // ========================================================================

    /// Take an advisory lock on `key` for `ttl`.
    pub async fn lock(&self, key: &str, ttl: Duration) -> CacheResult<EntityId> {
        self.locks.lock(key, ttl).await.inspect_err(|e| {
            tracing::debug!(key = %key, error = %e, "Lock rejected");
        })
    }

    pub async fn unlock(&self, key: &str, lock_id: EntityId) -> CacheResult<()> {
        self.locks.unlock(key, lock_id).await.inspect_err(|e| {
            tracing::warn!(key = %key, error = %e, "Unlock rejected");
        })
    }

    pub async fn is_locked(&self, key: &str) -> bool {
        self.locks.is_locked(key).await
    }

    /// The live lock on `key`, if any.
    pub async fn lock_holder(&self, key: &str) -> Option<AdvisoryLock> {
        self.locks.holder(key).await
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub async fn begin_transaction(&self) -> EntityId {
        self.transactions.begin().await
    }

    pub async fn add_to_transaction(&self, id: EntityId, op: TransactionOp) -> CacheResult<()> {
        self.transactions.add(id, op).await
    }

    /// Replay a pending transaction in append order.
    ///
    /// The first failing operation marks the transaction rolled back and its
    /// error is returned. Operations already applied stay applied.
    pub async fn commit_transaction(&self, id: EntityId) -> CacheResult<()> {
        let operations = self.transactions.operations(id).await?;
        let count = operations.len();

        for (index, op) in operations.into_iter().enumerate() {
            let kind = op.kind();
            if let Err(e) = self.apply(op).await {
                tracing::warn!(
                    transaction_id = %id,
                    index,
                    op = kind,
                    error = %e,
                    "Transaction operation failed, marking rolled back"
                );
                self.transactions
                    .finish(id, TransactionStatus::RolledBack)
                    .await?;
                self.events.emit(CacheEvent::TransactionRolledBack {
                    id,
                    reason: Some(e.to_string()),
                });
                return Err(e);
            }
        }

        self.transactions
            .finish(id, TransactionStatus::Committed)
            .await?;
        tracing::debug!(transaction_id = %id, operations = count, "Transaction committed");
        self.events.emit(CacheEvent::TransactionCommitted {
            id,
            operations: count,
        });
        Ok(())
    }

    /// Mark a pending transaction rolled back. Nothing is reverted.
    pub async fn rollback_transaction(&self, id: EntityId) -> CacheResult<()> {
        self.transactions
            .finish(id, TransactionStatus::RolledBack)
            .await?;
        tracing::debug!(transaction_id = %id, "Transaction rolled back");
        self.events
            .emit(CacheEvent::TransactionRolledBack { id, reason: None });
        Ok(())
    }

    pub async fn transaction_status(&self, id: EntityId) -> CacheResult<TransactionStatus> {
        self.transactions.status(id).await
    }

    async fn apply(&self, op: TransactionOp) -> CacheResult<()> {
        match op {
            TransactionOp::Get { key } => {
                self.get(&key, GetOptions::default()).await;
                Ok(())
            }
            TransactionOp::Set {
                key,
                value,
                options,
            } => self.set(&key, &value, options).await,
            TransactionOp::Delete { keys } => self.delete_many(&keys).await,
            TransactionOp::Invalidate { request } => self.invalidate(request).await.map(|_| ()),
        }
    }

    // ========================================================================
    // Patterns and refresh
    // ========================================================================

    /// Register a rule, replacing any rule with the same name. Interval rules
    /// start a periodic scan that emits a refresh event per matching key.
    pub fn add_pattern(&self, rule: PatternRule) {
        let timer = match rule.refresh {
            Some(RefreshStrategy::Interval(period)) => self.schedule_refresh_scan(&rule, period),
            _ => None,
        };
        let name = rule.name.clone();
        if let Some(previous) = self.patterns.insert(rule, timer) {
            self.scheduler.cancel(previous);
        }
        tracing::debug!(pattern = %name, "Pattern registered");
    }

    /// Remove a rule and stop its scan. Returns whether it existed.
    pub fn remove_pattern(&self, name: &str) -> bool {
        match self.patterns.remove(name) {
            Some((_, timer)) => {
                if let Some(timer) = timer {
                    self.scheduler.cancel(timer);
                }
                tracing::debug!(pattern = %name, "Pattern removed");
                true
            }
            None => false,
        }
    }

    pub fn patterns(&self) -> Vec<PatternRule> {
        self.patterns.rules()
    }

    pub fn pattern(&self, name: &str) -> Option<PatternRule> {
        self.patterns.get(name)
    }

    fn schedule_refresh_scan(&self, rule: &PatternRule, period: Duration) -> Option<TaskId> {
        let tiers = Arc::clone(&self.tiers);
        let events = self.events.clone();
        let name = rule.name.clone();
        let matcher = rule.matcher.clone();
        self.scheduler
            .schedule_every("refresh-scan", period, move || {
                let tiers = Arc::clone(&tiers);
                let events = events.clone();
                let name = name.clone();
                let matcher = matcher.clone();
                async move {
                    refresh_scan(&tiers, &events, &name, &matcher).await;
                }
            })
    }

    /// Arm a one-shot refresh event for `key`, replacing any pending one.
    fn arm_refresh(&self, key: &str, pattern: &str, delay: Duration) {
        let Ok(mut timers) = self.refresh_timers.lock() else {
            return;
        };
        if let Some((_, previous)) = timers.remove(key) {
            self.scheduler.cancel(previous);
        }

        let token = new_entity_id();
        let task = {
            let events = self.events.clone();
            let timers = Arc::clone(&self.refresh_timers);
            let key = key.to_string();
            let pattern = pattern.to_string();
            async move {
                events.emit(CacheEvent::Refresh {
                    key: key.clone(),
                    pattern: Some(pattern),
                });
                if let Ok(mut timers) = timers.lock() {
                    if timers.get(&key).map(|(t, _)| *t) == Some(token) {
                        timers.remove(&key);
                    }
                }
            }
        };

        if let Some(id) = self.scheduler.schedule_once("refresh", delay, task) {
            timers.insert(key.to_string(), (token, id));
            tracing::debug!(key = %key, pattern = %pattern, delay_ms = delay.as_millis() as u64, "Refresh armed");
        }
    }

    fn cancel_refresh(&self, key: &str) {
        let previous = match self.refresh_timers.lock() {
            Ok(mut timers) => timers.remove(key),
            Err(_) => None,
        };
        if let Some((_, id)) = previous {
            self.scheduler.cancel(id);
        }
    }

    fn cancel_all_refresh(&self) {
        let drained: Vec<TaskId> = match self.refresh_timers.lock() {
            Ok(mut timers) => timers.drain().map(|(_, (_, id))| id).collect(),
            Err(_) => Vec::new(),
        };
        for id in drained {
            self.scheduler.cancel(id);
        }
    }

    // ========================================================================
    // Reporting and lifecycle
    // ========================================================================

    pub async fn get_statistics(&self) -> CacheStatistics {
        collect_statistics(&self.tiers, &self.stats).await
    }

    pub async fn get_info(&self) -> CacheInfo {
        let mut tiers = Vec::with_capacity(self.tiers.len());
        for tier in self.tiers.iter() {
            let stats = match tier.stats().await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    tracing::warn!(tier = %tier.name(), error = %e, "Tier stats unavailable");
                    None
                }
            };
            tiers.push(TierInfo {
                descriptor: tier.descriptor().clone(),
                stats,
            });
        }

        CacheInfo {
            strategy: self.config.strategy,
            tiers,
            patterns: self.patterns.len(),
            live_locks: self.locks.live_count().await,
            pending_transactions: self.transactions.pending_count().await,
            dependency_keys: self.dependencies.len(),
            subscribers: self.events.receiver_count(),
            scheduled_tasks: self.scheduler.active_count(),
            compression: self.codec.compression_enabled(),
            encryption: self.codec.encryption_enabled(),
            eviction_policy: self.config.eviction_policy,
            clustering: self.config.clustering.clone(),
            uptime: self.started_at.elapsed(),
        }
    }

    /// Emit the persistence hook now. Returns the entry count reported.
    pub async fn persist(&self) -> u64 {
        emit_persist(&self.tiers, &self.events, &self.config.persistence).await
    }

    /// Stop every timer and release tier resources. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.scheduler.shutdown();
        self.locks.clear().await;
        self.transactions.clear().await;
        if let Ok(mut timers) = self.refresh_timers.lock() {
            timers.clear();
        }

        for tier in self.tiers.iter() {
            if let Err(e) = tier.shutdown().await {
                tracing::warn!(tier = %tier.name(), error = %e, "Tier shutdown failed");
            }
        }

        tracing::info!("Cache coordinator shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn emit_error(&self, operation: &str, key: Option<&str>, error: &CacheError) {
        self.events.emit(CacheEvent::Error {
            operation: operation.to_string(),
            key: key.map(str::to_string),
            message: error.to_string(),
        });
    }
}

impl Drop for CacheCoordinator {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

// ============================================================================
// BACKGROUND WORK
// ============================================================================

async fn collect_statistics(tiers: &[Arc<dyn Tier>], stats: &StatsRecorder) -> CacheStatistics {
    let mut all = Vec::with_capacity(tiers.len());
    let mut memory = Vec::new();
    for tier in tiers {
        match tier.stats().await {
            Ok(tier_stats) => {
                if tier.descriptor().is_memory() {
                    memory.push(tier_stats.clone());
                }
                all.push(tier_stats);
            }
            Err(e) => {
                tracing::warn!(tier = %tier.name(), error = %e, "Tier stats unavailable");
            }
        }
    }
    stats.snapshot(&all, &memory)
}

async fn tier_evictions(tiers: &[Arc<dyn Tier>]) -> u64 {
    let mut total = 0;
    for tier in tiers {
        if let Ok(stats) = tier.stats().await {
            total += stats.evictions;
        }
    }
    total
}

async fn emit_persist(
    tiers: &[Arc<dyn Tier>],
    events: &EventBus,
    persistence: &PersistenceConfig,
) -> u64 {
    let mut entries = 0u64;
    for tier in tiers {
        match tier.stats().await {
            Ok(stats) => entries += stats.entry_count,
            Err(e) => {
                tracing::warn!(tier = %tier.name(), error = %e, "Tier stats unavailable for persistence");
            }
        }
    }
    tracing::debug!(entries, format = ?persistence.format, "Persistence hook");
    events.emit(CacheEvent::Persist {
        location: persistence.location.clone(),
        format: persistence.format,
        entries,
    });
    entries
}

async fn refresh_scan(
    tiers: &[Arc<dyn Tier>],
    events: &EventBus,
    pattern: &str,
    matcher: &KeyMatcher,
) {
    let mut matched = BTreeSet::new();
    for tier in tiers {
        match tier.keys().await {
            Ok(keys) => matched.extend(keys.into_iter().filter(|key| matcher.matches(key))),
            Err(e) => {
                tracing::warn!(tier = %tier.name(), pattern = %pattern, error = %e, "Refresh scan skipped tier");
            }
        }
    }

    tracing::debug!(pattern = %pattern, keys = matched.len(), "Refresh scan");
    for key in matched {
        events.emit(CacheEvent::Refresh {
            key,
            pattern: Some(pattern.to_string()),
        });
    }
}
