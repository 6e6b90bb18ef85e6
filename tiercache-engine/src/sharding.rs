//! Shard selection for the distributed strategy.

use sha2::{Digest, Sha256};
use tiercache_core::ShardingMode;

/// Index of the tier that owns `key` among `count` tiers.
///
/// `ConsistentHash` is accepted but has no ring behind it and always
/// resolves to the first tier.
pub fn shard_index(key: &str, count: usize, mode: ShardingMode) -> usize {
    if count == 0 {
        return 0;
    }
    match mode {
        ShardingMode::HashMod => {
            let digest = Sha256::digest(key.as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&digest[..8]);
            (u64::from_be_bytes(prefix) % count as u64) as usize
        }
        ShardingMode::ConsistentHash => 0,
    }
}

/// Replica tiers following `primary`, wrapping around. At most
/// `count - 1` replicas are returned.
pub fn replica_indices(primary: usize, count: usize, replication_factor: usize) -> Vec<usize> {
    let replicas = replication_factor.saturating_sub(1).min(count.saturating_sub(1));
    (1..=replicas).map(|offset| (primary + offset) % count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hash_mod_is_stable() {
        let a = shard_index("user:42", 3, ShardingMode::HashMod);
        let b = shard_index("user:42", 3, ShardingMode::HashMod);
        assert_eq!(a, b);
    }

    #[test]
    fn test_consistent_hash_resolves_to_first_tier() {
        for key in ["a", "b", "c", "user:1"] {
            assert_eq!(shard_index(key, 5, ShardingMode::ConsistentHash), 0);
        }
    }

    #[test]
    fn test_hash_mod_spreads_keys() {
        let mut seen = [false; 3];
        for i in 0..100 {
            seen[shard_index(&format!("key:{}", i), 3, ShardingMode::HashMod)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_replicas_wrap_around() {
        assert_eq!(replica_indices(2, 3, 2), vec![0]);
        assert_eq!(replica_indices(1, 3, 3), vec![2, 0]);
        assert!(replica_indices(0, 3, 1).is_empty());
        assert_eq!(replica_indices(0, 2, 10), vec![1]);
    }

    proptest! {
        /// Property: shard index is always in range and replicas never repeat the primary.
        #[test]
        fn prop_shard_in_range(key in ".{0,32}", count in 1usize..16, replication in 1usize..16) {
            let primary = shard_index(&key, count, ShardingMode::HashMod);
            prop_assert!(primary < count);
            let replicas = replica_indices(primary, count, replication);
            prop_assert!(!replicas.contains(&primary));
            prop_assert!(replicas.len() < count);
        }
    }
}
