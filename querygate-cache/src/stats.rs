//! Cache introspection types.

use serde::Serialize;

/// Point-in-time view of the response cache.
///
/// Produced by `ResponseCache::stats`, which never mutates entries. Expired
/// entries that have not been purged yet are not counted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of live entries.
    pub entry_count: usize,
    /// Configured TTL in seconds, sub-second remainders rounded up.
    pub ttl_seconds: u64,
    /// Fingerprints of the live entries, sorted.
    pub keys: Vec<String>,
    /// Number of cache hits since construction.
    pub hits: u64,
    /// Number of cache misses since construction (expired reads included).
    pub misses: u64,
    /// Number of entries dropped to respect the capacity bound.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// TTL expressed in whole minutes, as the metrics dashboard reports it.
    pub fn ttl_minutes(&self) -> u64 {
        self.ttl_seconds / 60
    }
}
