//! QueryGate Core - Shared Types
//!
//! Errors, configuration, identifiers, cache fingerprints and the clock
//! abstraction used by the cache and conversation crates.

use chrono::{DateTime, Utc};

pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod identity;

pub use clock::{elapsed_between, system_clock, Clock, ManualClock, SystemClock};
pub use config::{
    require_positive, require_schedulable, QueryGateConfig, DEFAULT_CONTEXT_WINDOW,
    DEFAULT_HISTORY_LIMIT, DEFAULT_MAX_TURNS_PER_SESSION, DEFAULT_REAP_INTERVAL_SECS,
    DEFAULT_STALE_AFTER_SECS, DEFAULT_TTL_SECS,
};
pub use error::{ConfigError, QueryGateError, QueryGateResult, RuntimeError, ValidationError};
pub use fingerprint::{canonical_json, Fingerprint};
pub use identity::{SessionId, TenantId};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Convert a configured duration into a signed chrono delta.
///
/// Fails with `ConfigError::InvalidValue` for durations chrono cannot
/// represent, so the conversion happens once at construction time.
pub fn to_time_delta(
    field: &str,
    duration: std::time::Duration,
) -> QueryGateResult<chrono::TimeDelta> {
    chrono::TimeDelta::from_std(duration).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: format!("{}s", duration.as_secs()),
            reason: e.to_string(),
        }
        .into()
    })
}
