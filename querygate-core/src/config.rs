//! Configuration types

use crate::{ConfigError, QueryGateResult};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Default cache TTL in seconds (5 minutes).
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Default number of turns retained per session.
pub const DEFAULT_MAX_TURNS_PER_SESSION: usize = 10;

/// Default number of turns handed to the AI service as context.
pub const DEFAULT_CONTEXT_WINDOW: usize = 3;

/// Default interval between reaper sweeps in seconds (30 minutes).
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 1800;

/// Default idle time before a session is evicted in seconds (1 hour).
pub const DEFAULT_STALE_AFTER_SECS: u64 = 3600;

/// Default limit for `ConversationStore::history`.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Master configuration struct, consumed once at construction time.
///
/// Every field is independently defaultable, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryGateConfig {
    /// Response cache TTL.
    #[serde(default = "default_ttl_secs")]
    pub ttl_seconds: u64,

    /// Bound on stored turns per session (N).
    #[serde(default = "default_max_turns")]
    pub max_turns_per_session: usize,

    /// Turns included in a built context (K, at most N).
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Interval between reaper sweeps.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_seconds: u64,

    /// Idle time after which a session is evicted.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_seconds: u64,

    /// Optional capacity bound for the response cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cache_entries: Option<usize>,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS_PER_SESSION
}

fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}

fn default_reap_interval_secs() -> u64 {
    DEFAULT_REAP_INTERVAL_SECS
}

fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}

impl Default for QueryGateConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECS,
            max_turns_per_session: DEFAULT_MAX_TURNS_PER_SESSION,
            context_window: DEFAULT_CONTEXT_WINDOW,
            reap_interval_seconds: DEFAULT_REAP_INTERVAL_SECS,
            stale_after_seconds: DEFAULT_STALE_AFTER_SECS,
            max_cache_entries: None,
        }
    }
}

impl QueryGateConfig {
    /// Create QueryGateConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `QUERYGATE_TTL_SECONDS`: Cache TTL (default: 300)
    /// - `QUERYGATE_MAX_TURNS_PER_SESSION`: History bound (default: 10)
    /// - `QUERYGATE_CONTEXT_WINDOW`: Context window (default: 3)
    /// - `QUERYGATE_REAP_INTERVAL_SECONDS`: Reaper interval (default: 1800)
    /// - `QUERYGATE_STALE_AFTER_SECONDS`: Staleness threshold (default: 3600)
    /// - `QUERYGATE_MAX_CACHE_ENTRIES`: Cache capacity (default: unbounded)
    ///
    /// Unset or unparsable values fall back to the defaults; call
    /// [`validate`](Self::validate) to reject out-of-range ones.
    pub fn from_env() -> Self {
        Self {
            ttl_seconds: env_or("QUERYGATE_TTL_SECONDS", DEFAULT_TTL_SECS),
            max_turns_per_session: env_or(
                "QUERYGATE_MAX_TURNS_PER_SESSION",
                DEFAULT_MAX_TURNS_PER_SESSION,
            ),
            context_window: env_or("QUERYGATE_CONTEXT_WINDOW", DEFAULT_CONTEXT_WINDOW),
            reap_interval_seconds: env_or(
                "QUERYGATE_REAP_INTERVAL_SECONDS",
                DEFAULT_REAP_INTERVAL_SECS,
            ),
            stale_after_seconds: env_or("QUERYGATE_STALE_AFTER_SECONDS", DEFAULT_STALE_AFTER_SECS),
            max_cache_entries: std::env::var("QUERYGATE_MAX_CACHE_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - every duration and bound is greater than zero
    /// - context_window <= max_turns_per_session
    /// - max_cache_entries, when set, is greater than zero
    pub fn validate(&self) -> QueryGateResult<()> {
        require_positive("ttlSeconds", self.ttl_seconds)?;
        require_positive("maxTurnsPerSession", self.max_turns_per_session as u64)?;
        require_positive("contextWindow", self.context_window as u64)?;
        require_positive("reapIntervalSeconds", self.reap_interval_seconds)?;
        require_schedulable("reapIntervalSeconds", self.reap_interval())?;
        require_positive("staleAfterSeconds", self.stale_after_seconds)?;

        if self.context_window > self.max_turns_per_session {
            return Err(ConfigError::InvalidValue {
                field: "contextWindow".to_string(),
                value: self.context_window.to_string(),
                reason: format!(
                    "must not exceed maxTurnsPerSession ({})",
                    self.max_turns_per_session
                ),
            }
            .into());
        }

        if let Some(max) = self.max_cache_entries {
            require_positive("maxCacheEntries", max as u64)?;
        }

        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_seconds)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Reject a zero value for a configuration field.
pub fn require_positive(field: &str, value: u64) -> QueryGateResult<()> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Reject a period too large to schedule from the current instant.
pub fn require_schedulable(field: &str, period: Duration) -> QueryGateResult<()> {
    if Instant::now().checked_add(period).is_none() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{}s", period.as_secs()),
            reason: "too large to schedule".to_string(),
        }
        .into());
    }
    Ok(())
}
