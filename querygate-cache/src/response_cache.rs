//! Fingerprinted, TTL-expiring response cache.
//!
//! Expiry is computed on read, not scheduled: an entry is visible while
//! `now - stored_at < ttl` and is purged by the first read that finds it
//! expired. There is no timer thread, so the only concurrency domain is the
//! single lock around the table.

use chrono::TimeDelta;
use querygate_core::{
    elapsed_between, system_clock, to_time_delta, Clock, Fingerprint, QueryGateResult, TenantId,
    Timestamp,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::stats::CacheStats;

/// A stored value and the instant it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Timestamp,
}

impl<V> CacheEntry<V> {
    /// True while `now - stored_at < ttl`.
    pub fn is_live_at(&self, now: Timestamp, ttl: TimeDelta) -> bool {
        elapsed_between(self.stored_at, now) < ttl
    }
}

/// Tenant-scoped response cache with a fixed TTL.
///
/// All mutation goes through `&self` methods; callers only ever receive
/// clones of stored values.
#[derive(Debug)]
pub struct ResponseCache<V = Value> {
    entries: RwLock<HashMap<Fingerprint, CacheEntry<V>>>,
    ttl: TimeDelta,
    ttl_std: Duration,
    max_entries: Option<usize>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone + Send + Sync> ResponseCache<V> {
    /// Create a cache using the system clock.
    pub fn new(config: CacheConfig) -> QueryGateResult<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> QueryGateResult<Self> {
        config.validate()?;
        Ok(Self {
            entries: RwLock::new(HashMap::new()),
            ttl: to_time_delta("ttlSeconds", config.ttl)?,
            ttl_std: config.ttl,
            max_entries: config.max_entries,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Deterministic key for `(tenant, operation, params)`.
    pub fn key(tenant: &TenantId, operation: &str, params: &Value) -> Fingerprint {
        Fingerprint::new(tenant, operation, params)
    }

    /// Look up a cached value. Returns `None` if absent or expired.
    pub fn get(&self, tenant: &TenantId, operation: &str, params: &Value) -> Option<V> {
        self.get_fingerprint(&Self::key(tenant, operation, params))
    }

    /// Look up a cached value by a precomputed fingerprint.
    ///
    /// An expired entry is removed on the way out, unless a concurrent `set`
    /// refreshed it between the read and the purge.
    pub fn get_fingerprint(&self, fingerprint: &Fingerprint) -> Option<V> {
        let now = self.clock.now();

        {
            let entries = self.read();
            match entries.get(fingerprint) {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %fingerprint, "Cache miss");
                    return None;
                }
                Some(entry) if entry.is_live_at(now, self.ttl) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %fingerprint, "Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.write();
        let still_expired = entries
            .get(fingerprint)
            .is_some_and(|entry| !entry.is_live_at(now, self.ttl));
        if still_expired {
            entries.remove(fingerprint);
            debug!(key = %fingerprint, "Cache entry expired, removing");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value, overwriting any previous entry and restarting its TTL.
    pub fn set(&self, tenant: &TenantId, operation: &str, params: &Value, value: V) {
        self.set_fingerprint(Self::key(tenant, operation, params), value);
    }

    /// Store a value under a precomputed fingerprint.
    ///
    /// With a capacity bound, a new key that would overflow the table first
    /// drops expired entries, then the oldest writes.
    pub fn set_fingerprint(&self, fingerprint: Fingerprint, value: V) {
        let now = self.clock.now();
        let mut entries = self.write();

        if let Some(max) = self.max_entries {
            if !entries.contains_key(&fingerprint) && entries.len() >= max {
                let ttl = self.ttl;
                entries.retain(|_, entry| entry.is_live_at(now, ttl));
                while entries.len() >= max {
                    if !self.evict_oldest(&mut entries) {
                        break;
                    }
                }
            }
        }

        debug!(key = %fingerprint, "Cache set");
        entries.insert(
            fingerprint,
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    /// Remove every entry for `tenant`, or everything when `tenant` is `None`.
    ///
    /// Runs under the write lock, so concurrent readers see the table either
    /// before or after the clear. Returns the number of removed entries.
    pub fn clear(&self, tenant: Option<&TenantId>) -> usize {
        let mut entries = self.write();
        let removed = match tenant {
            Some(tenant) => {
                let before = entries.len();
                entries.retain(|key, _| !key.belongs_to(tenant));
                before - entries.len()
            }
            None => {
                let removed = entries.len();
                entries.clear();
                removed
            }
        };
        drop(entries);

        info!(
            tenant = tenant.map(|t| t.as_str()).unwrap_or("all"),
            removed,
            "Cache cleared"
        );
        removed
    }

    /// Drop every expired entry. Never needed for correctness, only to bound
    /// memory when entries are written but not read again.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live_at(now, ttl));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }
        purged
    }

    /// Read-only snapshot for the observability surface.
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.read();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_live_at(now, self.ttl))
            .map(|(key, _)| key.as_str().to_string())
            .collect();
        drop(entries);
        keys.sort();

        CacheStats {
            entry_count: keys.len(),
            ttl_seconds: whole_seconds_rounded_up(self.ttl_std),
            keys,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.read()
            .values()
            .filter(|entry| entry.is_live_at(now, self.ttl))
            .count()
    }

    /// Return `true` if no live entry exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored entries, expired-but-unpurged ones included.
    pub fn stored_len(&self) -> usize {
        self.read().len()
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl_std
    }

    // -- private helpers ---------------------------------------------------

    fn evict_oldest(&self, entries: &mut HashMap<Fingerprint, CacheEntry<V>>) -> bool {
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.stored_at)
            .map(|(key, _)| key.clone());
        match oldest {
            Some(key) => {
                debug!(key = %key, "Evicting oldest cache entry");
                entries.remove(&key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    // Every critical section is a single map operation, so a poisoned lock
    // still guards a consistent table.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Fingerprint, CacheEntry<V>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Fingerprint, CacheEntry<V>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sub-second remainders round up, so a live cache never reports a zero TTL.
fn whole_seconds_rounded_up(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querygate_core::ManualClock;
    use serde_json::json;
    use std::thread;

    fn tenant(raw: &str) -> TenantId {
        TenantId::new(raw).expect("valid tenant")
    }

    fn test_cache(ttl_secs: u64) -> (ResponseCache<String>, ManualClock) {
        let clock = ManualClock::starting_now();
        let cache = ResponseCache::with_clock(
            CacheConfig::new().with_ttl(Duration::from_secs(ttl_secs)),
            Arc::new(clock.clone()),
        )
        .expect("valid config");
        (cache, clock)
    }

    #[test]
    fn test_cache_hit_miss() {
        let (cache, _clock) = test_cache(60);
        let t = tenant("t1");
        assert!(cache.get(&t, "q", &json!({"x": 1})).is_none());
        cache.set(&t, "q", &json!({"x": 1}), "ans1".to_string());
        assert_eq!(cache.get(&t, "q", &json!({"x": 1})), Some("ans1".to_string()));
    }

    #[test]
    fn test_field_order_hits_same_entry() {
        let (cache, _clock) = test_cache(60);
        let t = tenant("t1");
        cache.set(&t, "q", &json!({"a": 1, "b": 2}), "v".to_string());
        assert_eq!(cache.get(&t, "q", &json!({"b": 2, "a": 1})), Some("v".to_string()));
    }

    #[test]
    fn test_visible_until_exactly_ttl() {
        let (cache, clock) = test_cache(60);
        let t = tenant("t1");
        cache.set(&t, "q", &json!({}), "v".to_string());

        clock.advance(Duration::from_millis(59_999));
        assert!(cache.get(&t, "q", &json!({})).is_some());

        clock.advance(Duration::from_millis(1));
        assert!(cache.get(&t, "q", &json!({})).is_none(), "expired at exactly ttl");
        assert_eq!(cache.stored_len(), 0, "expired read purges the entry");

        clock.advance_secs(3600);
        assert!(cache.get(&t, "q", &json!({})).is_none(), "never reappears");
    }

    #[test]
    fn test_overwrite_resets_expiry() {
        let (cache, clock) = test_cache(60);
        let t = tenant("t1");
        cache.set(&t, "q", &json!({}), "old".to_string());
        clock.advance_secs(50);
        cache.set(&t, "q", &json!({}), "new".to_string());
        clock.advance_secs(50);
        assert_eq!(cache.get(&t, "q", &json!({})), Some("new".to_string()));
    }

    #[test]
    fn test_clear_tenant_keeps_other_tenants() {
        let (cache, _clock) = test_cache(60);
        let a = tenant("shop-a");
        let b = tenant("shop-b");
        cache.set(&a, "orders", &json!({}), "a1".to_string());
        cache.set(&a, "products", &json!({}), "a2".to_string());
        cache.set(&b, "orders", &json!({}), "b1".to_string());

        assert_eq!(cache.clear(Some(&a)), 2);
        assert!(cache.get(&a, "orders", &json!({})).is_none());
        assert_eq!(cache.get(&b, "orders", &json!({})), Some("b1".to_string()));
    }

    #[test]
    fn test_clear_tenant_with_prefix_lookalike() {
        let (cache, _clock) = test_cache(60);
        let shop = tenant("shop");
        let shop_two = tenant("shop:2");
        cache.set(&shop, "q", &json!({}), "1".to_string());
        cache.set(&shop_two, "q", &json!({}), "2".to_string());

        cache.clear(Some(&shop));
        assert_eq!(cache.get(&shop_two, "q", &json!({})), Some("2".to_string()));
    }

    #[test]
    fn test_clear_all() {
        let (cache, _clock) = test_cache(60);
        cache.set(&tenant("a"), "q", &json!({}), "1".to_string());
        cache.set(&tenant("b"), "q", &json!({}), "2".to_string());
        assert_eq!(cache.clear(None), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_does_not_purge() {
        let (cache, clock) = test_cache(60);
        let t = tenant("t1");
        cache.set(&t, "q", &json!({"x": 1}), "v".to_string());
        cache.set(&t, "r", &json!({}), "w".to_string());

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.ttl_seconds, 60);
        assert_eq!(stats.keys, vec!["t1:q:{\"x\":1}".to_string(), "t1:r:{}".to_string()]);

        clock.advance_secs(61);
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 0);
        assert!(stats.keys.is_empty());
        assert_eq!(cache.stored_len(), 2, "stats never mutates");
    }

    #[test]
    fn test_stats_rounds_sub_second_ttl_up() {
        let cache: ResponseCache<String> =
            ResponseCache::new(CacheConfig::new().with_ttl(Duration::from_millis(500))).unwrap();
        assert_eq!(cache.stats().ttl_seconds, 1);

        let cache: ResponseCache<String> =
            ResponseCache::new(CacheConfig::new().with_ttl(Duration::from_millis(1500))).unwrap();
        assert_eq!(cache.stats().ttl_seconds, 2);
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let (cache, _clock) = test_cache(60);
        let t = tenant("t1");
        cache.set(&t, "q", &json!({}), "v".to_string());
        let _ = cache.get(&t, "q", &json!({}));
        let _ = cache.get(&t, "q", &json!({}));
        let _ = cache.get(&t, "missing", &json!({}));
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = test_cache(10);
        let t = tenant("t1");
        cache.set(&t, "old", &json!({}), "1".to_string());
        clock.advance_secs(5);
        cache.set(&t, "new", &json!({}), "2".to_string());
        clock.advance_secs(6);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stored_len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest_write() {
        let clock = ManualClock::starting_now();
        let cache: ResponseCache<String> = ResponseCache::with_clock(
            CacheConfig::new()
                .with_ttl(Duration::from_secs(60))
                .with_max_entries(2),
            Arc::new(clock.clone()),
        )
        .unwrap();
        let t = tenant("t1");

        cache.set(&t, "k0", &json!({}), "v0".to_string());
        clock.advance_secs(1);
        cache.set(&t, "k1", &json!({}), "v1".to_string());
        clock.advance_secs(1);
        cache.set(&t, "k2", &json!({}), "v2".to_string());

        assert!(cache.get(&t, "k0", &json!({})).is_none());
        assert!(cache.get(&t, "k1", &json!({})).is_some());
        assert!(cache.get(&t, "k2", &json!({})).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_capacity_prefers_expired_entries() {
        let clock = ManualClock::starting_now();
        let cache: ResponseCache<String> = ResponseCache::with_clock(
            CacheConfig::new()
                .with_ttl(Duration::from_secs(10))
                .with_max_entries(2),
            Arc::new(clock.clone()),
        )
        .unwrap();
        let t = tenant("t1");

        cache.set(&t, "stale", &json!({}), "s".to_string());
        clock.advance_secs(9);
        cache.set(&t, "fresh", &json!({}), "f".to_string());
        clock.advance_secs(2);
        cache.set(&t, "newest", &json!({}), "n".to_string());

        assert!(cache.get(&t, "fresh", &json!({})).is_some());
        assert!(cache.get(&t, "newest", &json!({})).is_some());
        assert_eq!(cache.stats().evictions, 0, "expired entry dropped, not evicted");
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let cache: ResponseCache<String> =
            ResponseCache::new(CacheConfig::new().with_max_entries(1)).unwrap();
        let t = tenant("t1");
        cache.set(&t, "q", &json!({}), "a".to_string());
        cache.set(&t, "q", &json!({}), "b".to_string());
        assert_eq!(cache.get(&t, "q", &json!({})), Some("b".to_string()));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ResponseCache::<Value>::new(CacheConfig::new().with_ttl(Duration::ZERO));
        assert!(result.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_json_values_by_default() {
        let cache: ResponseCache = ResponseCache::new(CacheConfig::default()).unwrap();
        let t = tenant("t1");
        cache.set(&t, "q", &json!({}), json!({"answer": 42}));
        assert_eq!(cache.get(&t, "q", &json!({})), Some(json!({"answer": 42})));
    }

    #[test]
    fn test_clear_is_atomic_for_concurrent_stats() {
        let cache: Arc<ResponseCache<String>> =
            Arc::new(ResponseCache::new(CacheConfig::default()).unwrap());
        let a = tenant("shop-a");
        let b = tenant("shop-b");
        const PER_TENANT: usize = 200;
        for i in 0..PER_TENANT {
            cache.set(&a, "q", &json!({ "i": i }), format!("a{i}"));
            cache.set(&b, "q", &json!({ "i": i }), format!("b{i}"));
        }

        let prefix = Fingerprint::tenant_prefix(&a);
        thread::scope(|scope| {
            let observer = scope.spawn(|| {
                for _ in 0..200 {
                    let seen = cache
                        .stats()
                        .keys
                        .iter()
                        .filter(|k| k.starts_with(&prefix))
                        .count();
                    assert!(
                        seen == PER_TENANT || seen == 0,
                        "observed a partially cleared tenant: {seen}"
                    );
                }
            });
            scope.spawn(|| {
                cache.clear(Some(&a));
            });
            observer.join().expect("observer thread");
        });

        assert_eq!(cache.len(), PER_TENANT);
    }

    #[test]
    fn test_concurrent_set_and_get() {
        let cache: Arc<ResponseCache<usize>> =
            Arc::new(ResponseCache::new(CacheConfig::default()).unwrap());
        let t = tenant("t1");

        thread::scope(|scope| {
            for worker in 0..8 {
                let cache = &cache;
                let t = &t;
                scope.spawn(move || {
                    for i in 0..100 {
                        let params = json!({ "worker": worker, "i": i });
                        cache.set(t, "q", &params, worker * 1000 + i);
                        assert_eq!(cache.get(t, "q", &params), Some(worker * 1000 + i));
                    }
                });
            }
        });

        assert_eq!(cache.len(), 800);
    }
}
