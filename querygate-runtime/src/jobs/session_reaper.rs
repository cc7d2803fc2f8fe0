//! Session Reaper Background Task
//!
//! Periodically evicts conversation sessions that have been idle for longer
//! than the staleness threshold, bounding the memory held by sessions whose
//! clients never come back.
//!
//! Each sweep runs on the blocking pool. A sweep that panics is reported as
//! a join error, logged and counted; the next tick sweeps again as usual.
//!
//! # Configuration
//!
//! ```rust
//! use querygate_runtime::jobs::ReaperConfig;
//! use std::time::Duration;
//!
//! let config = ReaperConfig {
//!     interval: Duration::from_secs(1800),   // Sweep every 30 minutes
//!     stale_after: Duration::from_secs(3600), // Evict after 1 hour idle
//!     log_evictions: true,                    // Log each evicted session
//! };
//! ```

use querygate_context::{ConversationStore, ReapOutcome};
use querygate_core::{
    require_positive, require_schedulable, QueryGateConfig, QueryGateResult,
    DEFAULT_REAP_INTERVAL_SECS, DEFAULT_STALE_AFTER_SECS,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the session reaper background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Time between sweeps (default: 30 minutes)
    pub interval: Duration,

    /// Idle time after which a session is evicted (default: 1 hour)
    pub stale_after: Duration,

    /// Whether to log each evicted session (default: true)
    pub log_evictions: bool,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            log_evictions: true,
        }
    }
}

impl ReaperConfig {
    /// Create ReaperConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `QUERYGATE_REAP_INTERVAL_SECONDS`: Time between sweeps (default: 1800)
    /// - `QUERYGATE_STALE_AFTER_SECONDS`: Idle threshold (default: 3600)
    /// - `QUERYGATE_REAPER_LOG_EVICTIONS`: Whether to log evictions (default: true)
    pub fn from_env() -> Self {
        let interval = Duration::from_secs(
            std::env::var("QUERYGATE_REAP_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REAP_INTERVAL_SECS),
        );

        let stale_after = Duration::from_secs(
            std::env::var("QUERYGATE_STALE_AFTER_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_STALE_AFTER_SECS),
        );

        let log_evictions = std::env::var("QUERYGATE_REAPER_LOG_EVICTIONS")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            interval,
            stale_after,
            log_evictions,
        }
    }

    /// Short intervals for local runs.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(60),
            log_evictions: true,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Reject zero durations and intervals too large to schedule.
    /// `tokio::time::interval` panics on a zero period.
    pub fn validate(&self) -> QueryGateResult<()> {
        require_positive("reapIntervalSeconds", self.interval.as_millis() as u64)?;
        require_schedulable("reapIntervalSeconds", self.interval)?;
        require_positive("staleAfterSeconds", self.stale_after.as_millis() as u64)?;
        Ok(())
    }
}

impl From<&QueryGateConfig> for ReaperConfig {
    fn from(config: &QueryGateConfig) -> Self {
        Self {
            interval: config.reap_interval(),
            stale_after: config.stale_after(),
            ..Self::default()
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for reaper activity since startup.
#[derive(Debug, Default)]
pub struct ReaperMetrics {
    /// Sweeps started
    pub sweeps: AtomicU64,

    /// Sessions removed for staleness
    pub sessions_evicted: AtomicU64,

    /// Sweeps that failed
    pub sweep_errors: AtomicU64,
}

impl ReaperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> ReaperSnapshot {
        ReaperSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of reaper metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaperSnapshot {
    pub sweeps: u64,
    pub sessions_evicted: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// SWEEP TARGET
// ============================================================================

/// Anything that can drop its stale sessions in one pass.
pub trait SessionSweeper: Send + Sync + 'static {
    fn reap_stale(&self, stale_after: Duration) -> ReapOutcome;
}

impl SessionSweeper for ConversationStore {
    fn reap_stale(&self, stale_after: Duration) -> ReapOutcome {
        ConversationStore::reap_stale(self, stale_after)
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// First-sweep delay used when the interval cannot be added to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Background task that periodically evicts stale sessions.
///
/// Runs until the shutdown signal is received or its sender is dropped.
/// The first sweep happens one full interval after start.
///
/// # Example
///
/// ```ignore
/// use tokio::sync::watch;
///
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(session_reaper_task(store, ReaperConfig::default(), shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn session_reaper_task<S: SessionSweeper>(
    store: Arc<S>,
    config: ReaperConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> Arc<ReaperMetrics> {
    let metrics = Arc::new(ReaperMetrics::new());
    run_session_reaper(store, config, Arc::clone(&metrics), shutdown_rx).await;
    metrics
}

/// Like [`session_reaper_task`], but records into caller-owned metrics so
/// they can be read while the task runs.
pub async fn run_session_reaper<S: SessionSweeper>(
    store: Arc<S>,
    config: ReaperConfig,
    metrics: Arc<ReaperMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let now = Instant::now();
    let first_sweep = now
        .checked_add(config.interval)
        .unwrap_or_else(|| now + FAR_FUTURE);
    let mut sweep_interval = interval_at(first_sweep, config.interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        stale_after_secs = config.stale_after.as_secs(),
        "Session reaper task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Session reaper task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                run_sweep(&store, &config, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        sessions_evicted = snapshot.sessions_evicted,
        sweep_errors = snapshot.sweep_errors,
        "Session reaper task completed"
    );
}

/// Perform one sweep, isolating any failure from the caller.
///
/// Returns the number of evicted sessions, or `None` if the sweep failed.
pub async fn run_sweep<S: SessionSweeper>(
    store: &Arc<S>,
    config: &ReaperConfig,
    metrics: &ReaperMetrics,
) -> Option<usize> {
    metrics.sweeps.fetch_add(1, Ordering::Relaxed);

    let target = Arc::clone(store);
    let stale_after = config.stale_after;
    let outcome = match tokio::task::spawn_blocking(move || target.reap_stale(stale_after)).await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Session reaper sweep failed");
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            return None;
        }
    };

    let evicted = outcome.evicted_count();
    metrics
        .sessions_evicted
        .fetch_add(evicted as u64, Ordering::Relaxed);

    if config.log_evictions {
        for session_id in &outcome.evicted {
            tracing::warn!(session_id = %session_id, "Evicted stale conversation session");
        }
    }

    if evicted > 0 {
        tracing::info!(
            examined = outcome.examined,
            evicted,
            "Session reaper sweep completed"
        );
    } else {
        tracing::trace!(
            examined = outcome.examined,
            "Session reaper sweep completed with no stale sessions"
        );
    }

    Some(evicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use querygate_context::ConversationConfig;
    use querygate_core::{ManualClock, SessionId};
    use std::sync::atomic::AtomicUsize;

    fn store_with_clock() -> (Arc<ConversationStore>, ManualClock) {
        let clock = ManualClock::starting_now();
        let store =
            ConversationStore::with_clock(ConversationConfig::default(), Arc::new(clock.clone()))
                .expect("valid config");
        (Arc::new(store), clock)
    }

    /// Panics on its first sweep, then reports nothing to evict.
    #[derive(Default)]
    struct FlakySweeper {
        calls: AtomicUsize,
    }

    impl SessionSweeper for FlakySweeper {
        fn reap_stale(&self, _stale_after: Duration) -> ReapOutcome {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("transient sweep failure");
            }
            ReapOutcome::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = ReaperConfig::default();
        assert_eq!(config.interval, Duration::from_secs(DEFAULT_REAP_INTERVAL_SECS));
        assert_eq!(config.stale_after, Duration::from_secs(DEFAULT_STALE_AFTER_SECS));
        assert!(config.log_evictions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_development() {
        let config = ReaperConfig::development();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.stale_after, Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_master() {
        let master = QueryGateConfig {
            reap_interval_seconds: 5,
            stale_after_seconds: 50,
            ..Default::default()
        };
        let config = ReaperConfig::from(&master);
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.stale_after, Duration::from_secs(50));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = ReaperConfig::default().with_interval(Duration::ZERO);
        assert!(config.validate().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_unschedulable_interval_rejected() {
        let config = ReaperConfig::default().with_interval(Duration::from_secs(u64::MAX));
        assert!(config.validate().unwrap_err().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_task_survives_unschedulable_interval() {
        let (store, _clock) = store_with_clock();
        let config = ReaperConfig::default().with_interval(Duration::from_secs(u64::MAX));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(session_reaper_task(store, config, shutdown_rx));

        tokio::task::yield_now().await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.expect("reaper task joins cleanly");
        assert_eq!(metrics.snapshot().sweeps, 0);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = ReaperMetrics::new();
        metrics.sweeps.store(4, Ordering::Relaxed);
        metrics.sessions_evicted.store(7, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sweeps, 4);
        assert_eq!(snapshot.sessions_evicted, 7);
        assert_eq!(snapshot.sweep_errors, 0);
    }

    #[tokio::test]
    async fn test_run_sweep_evicts_stale_sessions() {
        let (store, clock) = store_with_clock();
        let stale = SessionId::new("stale").unwrap();
        let fresh = SessionId::new("fresh").unwrap();
        store.record_turn(&stale, "q", "a");
        clock.advance_secs(3601);
        store.record_turn(&fresh, "q", "a");

        let metrics = ReaperMetrics::new();
        let evicted = run_sweep(&store, &ReaperConfig::default(), &metrics).await;

        assert_eq!(evicted, Some(1));
        assert!(store.snapshot(&stale).is_none());
        assert!(store.snapshot(&fresh).is_some());
        assert_eq!(metrics.snapshot().sessions_evicted, 1);
    }

    #[tokio::test]
    async fn test_failed_sweep_does_not_stop_next_sweep() {
        let sweeper = Arc::new(FlakySweeper::default());
        let config = ReaperConfig::default();
        let metrics = ReaperMetrics::new();

        assert_eq!(run_sweep(&sweeper, &config, &metrics).await, None);
        assert_eq!(run_sweep(&sweeper, &config, &metrics).await, Some(0));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sweeps, 2);
        assert_eq!(snapshot.sweep_errors, 1);
    }

    #[tokio::test]
    async fn test_task_stops_on_shutdown_signal() {
        let (store, _clock) = store_with_clock();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(session_reaper_task(
            store,
            ReaperConfig::default(),
            shutdown_rx,
        ));

        shutdown_tx.send(true).unwrap();
        let metrics = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reaper stopped")
            .expect("reaper joined");
        assert_eq!(metrics.snapshot().sweeps, 0, "first sweep waits a full interval");
    }

    #[tokio::test]
    async fn test_task_stops_when_sender_dropped() {
        let (store, _clock) = store_with_clock();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(session_reaper_task(
            store,
            ReaperConfig::default(),
            shutdown_rx,
        ));

        drop(shutdown_tx);
        assert!(tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_task_keeps_sweeping_after_failure() {
        let sweeper = Arc::new(FlakySweeper::default());
        let metrics = Arc::new(ReaperMetrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = ReaperConfig::default().with_interval(Duration::from_millis(10));

        let handle = tokio::spawn(run_session_reaper(
            Arc::clone(&sweeper),
            config,
            Arc::clone(&metrics),
            shutdown_rx,
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while metrics.snapshot().sweeps < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reaper kept sweeping");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(metrics.snapshot().sweep_errors, 1);
    }
}
