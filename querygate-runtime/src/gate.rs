//! Explicitly constructed handle owning both stores and the reaper.

use querygate_cache::{CacheConfig, CacheStats, ResponseCache};
use querygate_context::{ConversationConfig, ConversationStats, ConversationStore};
use querygate_core::{system_clock, Clock, QueryGateConfig, QueryGateResult, RuntimeError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::jobs::{run_session_reaper, ReaperConfig, ReaperMetrics, ReaperSnapshot};

/// Running cache, conversation store and session reaper.
///
/// Created with [`QueryGate::start`] inside a Tokio runtime and stopped with
/// [`QueryGate::shutdown`]. Dropping the handle without calling `shutdown`
/// also stops the reaper, since its shutdown channel closes.
#[derive(Debug)]
pub struct QueryGate {
    config: QueryGateConfig,
    cache: Arc<ResponseCache>,
    conversations: Arc<ConversationStore>,
    reaper_metrics: Arc<ReaperMetrics>,
    shutdown_tx: watch::Sender<bool>,
    reaper: JoinHandle<()>,
}

impl QueryGate {
    /// Validate `config`, build both stores and spawn the reaper.
    pub fn start(config: QueryGateConfig) -> QueryGateResult<Self> {
        Self::start_with_clock(config, system_clock())
    }

    /// Like [`start`](Self::start), with both stores reading `clock`.
    pub fn start_with_clock(
        config: QueryGateConfig,
        clock: Arc<dyn Clock>,
    ) -> QueryGateResult<Self> {
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RuntimeError::NoAsyncRuntime)?;

        let cache = Arc::new(ResponseCache::with_clock(
            CacheConfig::from(&config),
            Arc::clone(&clock),
        )?);
        let conversations = Arc::new(ConversationStore::with_clock(
            ConversationConfig::from(&config),
            clock,
        )?);
        let reaper_config = ReaperConfig::from(&config);
        reaper_config.validate()?;

        let reaper_metrics = Arc::new(ReaperMetrics::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reaper = runtime.spawn(run_session_reaper(
            Arc::clone(&conversations),
            reaper_config,
            Arc::clone(&reaper_metrics),
            shutdown_rx,
        ));

        tracing::info!(
            ttl_secs = config.ttl_seconds,
            max_turns = config.max_turns_per_session,
            context_window = config.context_window,
            "QueryGate started"
        );

        Ok(Self {
            config,
            cache,
            conversations,
            reaper_metrics,
            shutdown_tx,
            reaper,
        })
    }

    pub fn config(&self) -> &QueryGateConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Combined read-only view for the metrics surface.
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            cache: self.cache.stats(),
            conversations: self.conversations.stats(),
            reaper: self.reaper_metrics.snapshot(),
        }
    }

    /// Stop the reaper and wait for it to finish.
    pub async fn shutdown(self) -> QueryGateResult<ReaperSnapshot> {
        // A send error only means the reaper already exited.
        let _ = self.shutdown_tx.send(true);
        self.reaper.await.map_err(|e| RuntimeError::ReaperJoin {
            reason: e.to_string(),
        })?;

        let snapshot = self.reaper_metrics.snapshot();
        tracing::info!(
            sweeps = snapshot.sweeps,
            sessions_evicted = snapshot.sessions_evicted,
            "QueryGate stopped"
        );
        Ok(snapshot)
    }
}

/// Cache, conversation and reaper statistics taken together.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub cache: CacheStats,
    pub conversations: ConversationStats,
    pub reaper: ReaperSnapshot,
}

impl GatewayStats {
    pub fn overview(&self) -> GatewayOverview {
        GatewayOverview {
            active_sessions: self.conversations.active_session_count,
            cache_size: self.cache.entry_count,
            cache_ttl_minutes: self.cache.ttl_minutes(),
        }
    }
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayOverview {
    pub active_sessions: usize,
    pub cache_size: usize,
    pub cache_ttl_minutes: u64,
}
