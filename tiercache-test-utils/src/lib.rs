//! tiercache Test Utilities
//!
//! Shared test infrastructure for the tiercache workspace:
//! - Proptest generators for keys, values, tags and entries
//! - Mock tiers for failure injection
//! - Fixtures for common tier layouts
//! - Custom assertions for cache error variants

pub use tiercache_core::{
    CacheConfig, CacheEntry, CacheError, CacheResult, EvictionPolicyKind, LockError,
    SetOptions, TierDescriptor, TierError, TierKind, TierStats, Timestamp, TransactionError,
};
pub use tiercache_storage::{BackendTier, InMemoryBackend, MemoryTier, Tier, ASSUMED_ENTRY_SIZE};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// MOCK TIERS
// ============================================================================

/// Tier whose every call fails with a transport error.
#[derive(Debug)]
pub struct FailingTier {
    descriptor: TierDescriptor,
    calls: AtomicU64,
}

impl FailingTier {
    pub fn new(descriptor: TierDescriptor) -> Self {
        Self {
            descriptor,
            calls: AtomicU64::new(0),
        }
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> CacheResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::transport(&self.descriptor.name, "mock failure"))
    }
}

#[async_trait]
impl Tier for FailingTier {
    fn descriptor(&self) -> &TierDescriptor {
        &self.descriptor
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<CacheEntry>> {
        self.fail()
    }

    async fn set(&self, _entry: CacheEntry) -> CacheResult<()> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        self.fail()
    }

    async fn clear(&self) -> CacheResult<u64> {
        self.fail()
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        self.fail()
    }

    async fn keys_by_tag(&self, _tags: &[String]) -> CacheResult<Vec<String>> {
        self.fail()
    }

    async fn stats(&self) -> CacheResult<TierStats> {
        self.fail()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Generate a namespaced cache key such as `user:42`.
    pub fn arb_key() -> impl Strategy<Value = String> {
        ("[a-z]{1,8}", 0u32..1000).prop_map(|(ns, id)| format!("{}:{}", ns, id))
    }

    /// Generate a small set of distinct keys.
    pub fn arb_keys(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::btree_set(arb_key(), 1..=max.max(1))
            .prop_map(|keys| keys.into_iter().collect())
    }

    /// Generate a value, sometimes larger than the compression threshold.
    pub fn arb_value() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..256),
            prop::collection::vec(any::<u8>(), 1024..4096),
        ]
    }

    /// Generate a compressible value (repeated text).
    pub fn arb_compressible_value() -> impl Strategy<Value = Vec<u8>> {
        ("[a-z ]{4,16}", 100usize..400)
            .prop_map(|(chunk, repeat)| chunk.repeat(repeat).into_bytes())
    }

    pub fn arb_tag() -> impl Strategy<Value = String> {
        "[a-z]{2,10}"
    }

    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_tag(), 0..4)
    }

    /// Generate a TTL between one second and one day.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..86_400).prop_map(Duration::from_secs)
    }

    /// Generate a timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_eviction_policy() -> impl Strategy<Value = EvictionPolicyKind> {
        prop_oneof![
            Just(EvictionPolicyKind::Lru),
            Just(EvictionPolicyKind::Lfu),
            Just(EvictionPolicyKind::Fifo),
        ]
    }

    /// Generate set options with optional TTL and tags.
    pub fn arb_set_options() -> impl Strategy<Value = SetOptions> {
        (prop::option::of(arb_ttl()), arb_tags()).prop_map(|(ttl, tags)| {
            let options = SetOptions::new().with_tags(tags);
            match ttl {
                Some(ttl) => options.with_ttl(ttl),
                None => options,
            }
        })
    }

    /// Generate a live entry.
    pub fn arb_entry() -> impl Strategy<Value = CacheEntry> {
        (arb_key(), arb_value(), arb_ttl(), arb_tags())
            .prop_map(|(key, value, ttl, tags)| CacheEntry::new(key, value, Some(ttl)).with_tags(tags))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built tiers and configs.

    use super::*;

    /// Memory tier descriptor sized for `slots` entries.
    pub fn memory_descriptor(slots: u64) -> TierDescriptor {
        TierDescriptor::new("memory", TierKind::Memory, 1, slots * ASSUMED_ENTRY_SIZE)
    }

    pub fn remote_descriptor() -> TierDescriptor {
        TierDescriptor::new("remote", TierKind::Remote, 2, 1 << 24)
    }

    pub fn disk_descriptor() -> TierDescriptor {
        TierDescriptor::new("disk", TierKind::Disk, 3, 1 << 26)
    }

    /// LRU memory tier holding at most `slots` entries.
    pub fn memory_tier(slots: u64) -> Arc<MemoryTier> {
        Arc::new(MemoryTier::new(
            memory_descriptor(slots),
            EvictionPolicyKind::Lru,
        ))
    }

    /// Map-backed tier whose backend can be switched off.
    pub fn flaky_tier(descriptor: TierDescriptor) -> Arc<BackendTier<InMemoryBackend>> {
        Arc::new(BackendTier::new(descriptor, InMemoryBackend::new()))
    }

    /// Memory, remote and disk tiers with map backends.
    pub fn standard_tiers(memory_slots: u64) -> Vec<Arc<dyn Tier>> {
        vec![
            memory_tier(memory_slots) as Arc<dyn Tier>,
            flaky_tier(remote_descriptor()),
            flaky_tier(disk_descriptor()),
        ]
    }

    /// Default config with compression on and a fixed encryption key.
    pub fn encrypted_config() -> CacheConfig {
        CacheConfig::default()
            .with_compression(true)
            .with_compression_threshold(64)
            .with_encryption(true)
            .with_encryption_key("00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for cache error variants.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_transport_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Tier(TierError::Transport { .. })) => {}
            other => panic!("Expected Transport error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_tier_not_found<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Tier(TierError::NotFound { .. })) => {}
            other => panic!("Expected TierNotFound error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_already_locked<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Lock(LockError::AlreadyLocked { .. })) => {}
            other => panic!("Expected AlreadyLocked error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_invalid_lock_id<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Lock(LockError::InvalidLockId { .. })) => {}
            other => panic!("Expected InvalidLockId error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_transaction_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Transaction(_)) => {}
            other => panic!("Expected Transaction error, got: {:?}", other),
        }
    }
}
