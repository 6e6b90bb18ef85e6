//! Statistics snapshot.

use serde::{Deserialize, Serialize};

/// Process-wide cache statistics, reset only by an explicit clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub writes: u64,
    pub deletes: u64,
    /// Stored bytes summed across tiers.
    pub total_size: u64,
    /// Resident entries summed across tiers.
    pub item_count: u64,
    /// `hits / (hits + misses) * 100`, 0 before any request.
    pub hit_rate: f64,
    /// Running mean read latency in milliseconds.
    pub average_latency_ms: f64,
    /// Stored bytes in memory-kind tiers.
    pub memory_usage: u64,
}

impl CacheStatistics {
    /// Hit rate as a percentage.
    pub fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        }
    }

    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hit_rate_zero_without_requests() {
        assert_eq!(CacheStatistics::compute_hit_rate(0, 0), 0.0);
    }

    #[test]
    fn test_hit_rate_percentage() {
        assert!((CacheStatistics::compute_hit_rate(80, 20) - 80.0).abs() < 1e-9);
    }

    proptest! {
        /// Property: hit rate is a percentage in [0, 100].
        #[test]
        fn prop_hit_rate_bounded(hits in 0u64..1_000_000, misses in 0u64..1_000_000) {
            let rate = CacheStatistics::compute_hit_rate(hits, misses);
            prop_assert!((0.0..=100.0).contains(&rate));
            if misses == 0 && hits > 0 {
                prop_assert!((rate - 100.0).abs() < 1e-9);
            }
        }
    }
}
