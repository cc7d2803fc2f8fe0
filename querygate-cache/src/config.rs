//! Response cache configuration.

use querygate_core::{
    require_positive, ConfigError, QueryGateConfig, QueryGateResult, DEFAULT_TTL_SECS,
};
use std::time::Duration;

/// Configuration for the response cache.
///
/// TTL is fixed per cache instance; every entry expires the same amount of
/// time after its last write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time an entry stays visible after being written.
    pub ttl: Duration,
    /// Optional capacity bound. When exceeded, the oldest write is evicted.
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_entries: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the capacity bound.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Reject a zero TTL or a zero capacity.
    pub fn validate(&self) -> QueryGateResult<()> {
        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ttlSeconds".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        if let Some(max) = self.max_entries {
            require_positive("maxCacheEntries", max as u64)?;
        }
        Ok(())
    }
}

impl From<&QueryGateConfig> for CacheConfig {
    fn from(config: &QueryGateConfig) -> Self {
        Self {
            ttl: config.ttl(),
            max_entries: config.max_cache_entries,
        }
    }
}
