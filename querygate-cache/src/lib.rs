//! QueryGate Cache - Response Cache
//!
//! Tenant-scoped key/value store for idempotent lookups against upstream
//! data. Keys are [`Fingerprint`]s built from tenant, operation and
//! canonicalised parameters; every entry expires a fixed TTL after its last
//! write.
//!
//! ```ignore
//! let cache: ResponseCache = ResponseCache::new(CacheConfig::default())?;
//! cache.set(&tenant, "top_products", &params, answer.clone());
//! assert_eq!(cache.get(&tenant, "top_products", &params), Some(answer));
//! cache.clear(Some(&tenant));
//! ```
//!
//! [`Fingerprint`]: querygate_core::Fingerprint

pub mod config;
pub mod response_cache;
pub mod stats;

pub use config::CacheConfig;
pub use response_cache::{CacheEntry, ResponseCache};
pub use stats::CacheStats;
