//! Cache Metrics System
//!
//! [`Stats`] is a plain snapshot of the per-bucket counters, filled by
//! [`GenCache::update_stats`](crate::GenCache::update_stats). Each bucket is
//! locked briefly in turn, so the snapshot is not atomic across buckets.
//!
//! The [`CacheMetrics`] trait reports the same numbers as a `BTreeMap`, which
//! keeps metric names in a deterministic order for logs and CSV exports.

use std::collections::BTreeMap;

/// Aggregated cache counters.
///
/// `update_stats` **adds** to the fields instead of overwriting them, so one
/// `Stats` value can aggregate several caches. Call [`Stats::reset`] before
/// reusing it for a fresh snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Stats {
    /// Number of lookups (`get`, `has_get`, `get_with`, `has`).
    pub get_calls: u64,

    /// Number of writes (`set`, `stop_set`), including dropped ones.
    pub set_calls: u64,

    /// Lookups that did not return a value.
    pub misses: u64,

    /// Lookups whose fingerprint matched an entry stored for another key.
    pub collisions: u64,

    /// Chunks reclaimed from an earlier lap of a bucket ring.
    pub evictions: u64,

    /// Writes dropped because the entry cannot fit in a single chunk.
    pub dropped: u64,

    /// Index entries currently held. Entries left behind by an old generation
    /// are counted until they are overwritten or looked up.
    pub entries_count: u64,

    /// Bytes of chunk memory currently held by the buckets.
    pub bytes_size: u64,

    /// Upper bound on `bytes_size`.
    pub max_bytes_size: u64,

    /// Sum of the bucket generations (ring wraps since the last reset).
    pub generations: u64,
}

impl Stats {
    /// Zeroes every field.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Number of lookups that returned a value.
    pub fn hits(&self) -> u64 {
        self.get_calls.saturating_sub(self.misses)
    }

    /// Fraction of lookups that returned a value, or 0.0 without lookups.
    pub fn hit_rate(&self) -> f64 {
        if self.get_calls > 0 {
            self.hits() as f64 / self.get_calls as f64
        } else {
            0.0
        }
    }

    /// Fraction of the chunk budget currently held.
    pub fn utilization(&self) -> f64 {
        if self.max_bytes_size > 0 {
            self.bytes_size as f64 / self.max_bytes_size as f64
        } else {
            0.0
        }
    }

    /// Converts the snapshot to a map with deterministic key ordering.
    pub fn to_btreemap(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        metrics.insert("get_calls".to_string(), self.get_calls as f64);
        metrics.insert("set_calls".to_string(), self.set_calls as f64);
        metrics.insert("hits".to_string(), self.hits() as f64);
        metrics.insert("misses".to_string(), self.misses as f64);
        metrics.insert("collisions".to_string(), self.collisions as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert("dropped".to_string(), self.dropped as f64);
        metrics.insert("hit_rate".to_string(), self.hit_rate());

        metrics.insert("entries_count".to_string(), self.entries_count as f64);
        metrics.insert("bytes_size".to_string(), self.bytes_size as f64);
        metrics.insert("max_bytes_size".to_string(), self.max_bytes_size as f64);
        metrics.insert("utilization".to_string(), self.utilization());
        metrics.insert("generations".to_string(), self.generations as f64);

        metrics
    }
}

/// Uniform metrics reporting for cache implementations.
pub trait CacheMetrics {
    /// Returns all metrics as key-value pairs in deterministic order.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Name identifying the cache implementation in reports.
    fn algorithm_name(&self) -> &'static str;
}
