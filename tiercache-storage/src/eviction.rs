//! Eviction policies for the memory tier.
//!
//! A policy only tracks key order; the tier owns the entries and asks the
//! policy for a victim when it is full.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tiercache_core::EvictionPolicyKind;

/// Bookkeeping interface consulted by [`crate::MemoryTier`].
pub trait EvictionPolicy: Send + Sync {
    /// A new key became resident.
    fn on_insert(&mut self, key: &str);

    /// A resident key was read or overwritten.
    fn on_access(&mut self, key: &str);

    /// A key left the tier for any reason.
    fn on_remove(&mut self, key: &str);

    /// Key that should be evicted next, if any.
    fn victim(&self) -> Option<String>;

    fn clear(&mut self);

    fn kind(&self) -> EvictionPolicyKind;
}

/// Build the policy selected in configuration.
pub fn policy_for(kind: EvictionPolicyKind) -> Box<dyn EvictionPolicy> {
    match kind {
        EvictionPolicyKind::Lru => Box::new(LruPolicy::default()),
        EvictionPolicyKind::Lfu => Box::new(LfuPolicy::default()),
        EvictionPolicyKind::Fifo => Box::new(FifoPolicy::default()),
    }
}

// ============================================================================
// ORDER INDEX
// ============================================================================

/// Keys ordered by a monotonically increasing stamp.
#[derive(Debug, Default)]
struct StampOrder {
    next: u64,
    stamps: HashMap<String, u64>,
    order: BTreeMap<u64, String>,
}

impl StampOrder {
    /// Move `key` to the newest position, inserting it if absent.
    fn bump(&mut self, key: &str) {
        if let Some(old) = self.stamps.get(key).copied() {
            self.order.remove(&old);
        }
        self.next += 1;
        self.stamps.insert(key.to_string(), self.next);
        self.order.insert(self.next, key.to_string());
    }

    fn remove(&mut self, key: &str) {
        if let Some(stamp) = self.stamps.remove(key) {
            self.order.remove(&stamp);
        }
    }

    fn oldest(&self) -> Option<String> {
        self.order.values().next().cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.stamps.contains_key(key)
    }

    fn clear(&mut self) {
        self.stamps.clear();
        self.order.clear();
    }
}

// ============================================================================
// POLICIES
// ============================================================================

/// Least recently used. Reads and overwrites refresh a key's position.
#[derive(Debug, Default)]
pub struct LruPolicy {
    order: StampOrder,
}

impl EvictionPolicy for LruPolicy {
    fn on_insert(&mut self, key: &str) {
        self.order.bump(key);
    }

    fn on_access(&mut self, key: &str) {
        if self.order.contains(key) {
            self.order.bump(key);
        }
    }

    fn on_remove(&mut self, key: &str) {
        self.order.remove(key);
    }

    fn victim(&self) -> Option<String> {
        self.order.oldest()
    }

    fn clear(&mut self) {
        self.order.clear();
    }

    fn kind(&self) -> EvictionPolicyKind {
        EvictionPolicyKind::Lru
    }
}

/// First in, first out. Accesses do not change the order.
#[derive(Debug, Default)]
pub struct FifoPolicy {
    order: StampOrder,
}

impl EvictionPolicy for FifoPolicy {
    fn on_insert(&mut self, key: &str) {
        if !self.order.contains(key) {
            self.order.bump(key);
        }
    }

    fn on_access(&mut self, _key: &str) {}

    fn on_remove(&mut self, key: &str) {
        self.order.remove(key);
    }

    fn victim(&self) -> Option<String> {
        self.order.oldest()
    }

    fn clear(&mut self) {
        self.order.clear();
    }

    fn kind(&self) -> EvictionPolicyKind {
        EvictionPolicyKind::Fifo
    }
}

/// Least frequently used; ties go to the least recently used.
#[derive(Debug, Default)]
pub struct LfuPolicy {
    next: u64,
    /// key -> (frequency, last stamp)
    counts: HashMap<String, (u64, u64)>,
    ranked: BTreeSet<(u64, u64, String)>,
}

impl LfuPolicy {
    fn record(&mut self, key: &str, frequency: u64) {
        self.next += 1;
        self.counts.insert(key.to_string(), (frequency, self.next));
        self.ranked.insert((frequency, self.next, key.to_string()));
    }

    fn unrank(&mut self, key: &str) -> Option<u64> {
        let (frequency, stamp) = self.counts.remove(key)?;
        self.ranked.remove(&(frequency, stamp, key.to_string()));
        Some(frequency)
    }
}

impl EvictionPolicy for LfuPolicy {
    fn on_insert(&mut self, key: &str) {
        let frequency = self.unrank(key).unwrap_or(0);
        self.record(key, frequency + 1);
    }

    fn on_access(&mut self, key: &str) {
        if let Some(frequency) = self.unrank(key) {
            self.record(key, frequency + 1);
        }
    }

    fn on_remove(&mut self, key: &str) {
        self.unrank(key);
    }

    fn victim(&self) -> Option<String> {
        self.ranked.iter().next().map(|(_, _, key)| key.clone())
    }

    fn clear(&mut self) {
        self.counts.clear();
        self.ranked.clear();
    }

    fn kind(&self) -> EvictionPolicyKind {
        EvictionPolicyKind::Lfu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lru_access_refreshes_position() {
        let mut policy = LruPolicy::default();
        policy.on_insert("a");
        policy.on_insert("b");
        policy.on_insert("c");
        assert_eq!(policy.victim().as_deref(), Some("a"));

        policy.on_access("a");
        assert_eq!(policy.victim().as_deref(), Some("b"));

        policy.on_remove("b");
        assert_eq!(policy.victim().as_deref(), Some("c"));
    }

    #[test]
    fn test_lru_access_of_unknown_key_is_ignored() {
        let mut policy = LruPolicy::default();
        policy.on_access("ghost");
        assert_eq!(policy.victim(), None);
    }

    #[test]
    fn test_fifo_ignores_access() {
        let mut policy = FifoPolicy::default();
        policy.on_insert("a");
        policy.on_insert("b");
        policy.on_access("a");
        policy.on_insert("a");
        assert_eq!(policy.victim().as_deref(), Some("a"));
    }

    #[test]
    fn test_lfu_prefers_cold_keys() {
        let mut policy = LfuPolicy::default();
        policy.on_insert("hot");
        policy.on_insert("cold");
        policy.on_access("hot");
        policy.on_access("hot");
        assert_eq!(policy.victim().as_deref(), Some("cold"));

        policy.on_access("cold");
        policy.on_access("cold");
        policy.on_access("cold");
        assert_eq!(policy.victim().as_deref(), Some("hot"));
    }

    #[test]
    fn test_lfu_ties_break_by_age() {
        let mut policy = LfuPolicy::default();
        policy.on_insert("first");
        policy.on_insert("second");
        assert_eq!(policy.victim().as_deref(), Some("first"));
    }

    #[test]
    fn test_clear_and_kind() {
        for kind in [
            EvictionPolicyKind::Lru,
            EvictionPolicyKind::Lfu,
            EvictionPolicyKind::Fifo,
        ] {
            let mut policy = policy_for(kind);
            assert_eq!(policy.kind(), kind);
            policy.on_insert("x");
            policy.clear();
            assert_eq!(policy.victim(), None);
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u8),
        Access(u8),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8).prop_map(Op::Insert),
            (0u8..8).prop_map(Op::Access),
            (0u8..8).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: LRU victim is always the least recently touched resident key.
        #[test]
        fn prop_lru_matches_reference_model(ops in prop::collection::vec(op_strategy(), 0..64)) {
            let mut policy = LruPolicy::default();
            let mut model: Vec<String> = Vec::new();

            for op in ops {
                match op {
                    Op::Insert(k) => {
                        let key = k.to_string();
                        model.retain(|m| m != &key);
                        model.push(key.clone());
                        policy.on_insert(&key);
                    }
                    Op::Access(k) => {
                        let key = k.to_string();
                        if let Some(pos) = model.iter().position(|m| m == &key) {
                            model.remove(pos);
                            model.push(key.clone());
                        }
                        policy.on_access(&key);
                    }
                    Op::Remove(k) => {
                        let key = k.to_string();
                        model.retain(|m| m != &key);
                        policy.on_remove(&key);
                    }
                }
                prop_assert_eq!(policy.victim(), model.first().cloned());
            }
        }
    }
}
