//! Statistics recording.
//!
//! Counters are atomics; the running latency mean sits behind a mutex since
//! it needs a consistent (mean, samples) pair. Tier eviction counters are
//! lifetime totals, so evictions are reported relative to the total seen at
//! the last reset.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tiercache_core::{CacheStatistics, TierStats};

#[derive(Debug, Default)]
struct LatencyMean {
    mean_ms: f64,
    samples: u64,
}

/// Process-wide counters behind [`CacheStatistics`].
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    evictions_baseline: AtomicU64,
    latency: Mutex<LatencyMean>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, latency: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_miss(&self, latency: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut mean) = self.latency.lock() {
            mean.samples += 1;
            let sample = latency.as_secs_f64() * 1000.0;
            mean.mean_ms += (sample - mean.mean_ms) / mean.samples as f64;
        }
    }

    /// Combine counters with per-tier usage. `memory` holds the stats of
    /// memory-kind tiers only.
    pub fn snapshot(&self, tiers: &[TierStats], memory: &[TierStats]) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let average_latency_ms = self
            .latency
            .lock()
            .map(|mean| mean.mean_ms)
            .unwrap_or_default();

        CacheStatistics {
            hits,
            misses,
            evictions: tiers
                .iter()
                .map(|t| t.evictions)
                .sum::<u64>()
                .saturating_sub(self.evictions_baseline.load(Ordering::Relaxed)),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            total_size: tiers.iter().map(|t| t.size_bytes).sum(),
            item_count: tiers.iter().map(|t| t.entry_count).sum(),
            hit_rate: CacheStatistics::compute_hit_rate(hits, misses),
            average_latency_ms,
            memory_usage: memory.iter().map(|t| t.size_bytes).sum(),
        }
    }

    /// Zero every counter. `tier_evictions` is the current sum of the tiers'
    /// lifetime eviction counters.
    pub fn reset(&self, tier_evictions: u64) {
        self.evictions_baseline.store(tier_evictions, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        if let Ok(mut mean) = self.latency.lock() {
            *mean = LatencyMean::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let stats = StatsRecorder::new();
        stats.record_hit(Duration::from_millis(10));
        stats.record_miss(Duration::from_millis(20));
        stats.record_hit(Duration::from_millis(30));

        let snapshot = stats.snapshot(&[], &[]);
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert!((snapshot.average_latency_ms - 20.0).abs() < 1e-6);
        assert!((snapshot.hit_rate - 200.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_snapshot_aggregates_tiers() {
        let stats = StatsRecorder::new();
        let memory = TierStats {
            size_bytes: 100,
            entry_count: 2,
            evictions: 1,
        };
        let disk = TierStats {
            size_bytes: 1000,
            entry_count: 5,
            evictions: 0,
        };
        let snapshot = stats.snapshot(&[memory.clone(), disk], &[memory]);
        assert_eq!(snapshot.total_size, 1100);
        assert_eq!(snapshot.item_count, 7);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.memory_usage, 100);
        assert_eq!(snapshot.hit_rate, 0.0);
    }

    #[test]
    fn test_reset() {
        let stats = StatsRecorder::new();
        stats.record_write();
        stats.record_deletes(3);
        stats.record_hit(Duration::from_millis(5));
        stats.reset(0);
        assert_eq!(stats.snapshot(&[], &[]), CacheStatistics::default());
    }

    #[test]
    fn test_evictions_relative_to_reset() {
        let stats = StatsRecorder::new();
        let tier = |evictions| TierStats {
            size_bytes: 0,
            entry_count: 0,
            evictions,
        };
        assert_eq!(stats.snapshot(&[tier(4)], &[]).evictions, 4);

        stats.reset(4);
        assert_eq!(stats.snapshot(&[tier(4)], &[]).evictions, 0);
        assert_eq!(stats.snapshot(&[tier(7)], &[]).evictions, 3);
    }
}
