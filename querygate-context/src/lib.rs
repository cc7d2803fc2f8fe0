//! QueryGate Context - Conversation Memory
//!
//! Keeps a bounded history of question/answer turns per session and projects
//! the most recent ones into a [`ConversationContext`] for the AI service, so
//! follow-up questions can refer back to earlier answers.
//!
//! Sessions live in a sharded concurrent map. Every mutation of one session
//! happens under that session's shard lock, which makes per-session
//! operations linearizable without a global pause.

use chrono::TimeDelta;
use dashmap::DashMap;
use querygate_core::{
    elapsed_between, require_positive, system_clock, Clock, ConfigError, QueryGateConfig,
    QueryGateResult, SessionId, Timestamp, DEFAULT_CONTEXT_WINDOW, DEFAULT_HISTORY_LIMIT,
    DEFAULT_MAX_TURNS_PER_SESSION,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Bounds applied to every session of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationConfig {
    /// Maximum turns retained per session (N).
    pub max_turns: usize,
    /// Turns projected into a built context (K, at most N).
    pub context_window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS_PER_SESSION,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl ConversationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    /// Both bounds must be positive and the window must fit in the history.
    pub fn validate(&self) -> QueryGateResult<()> {
        require_positive("maxTurnsPerSession", self.max_turns as u64)?;
        require_positive("contextWindow", self.context_window as u64)?;
        if self.context_window > self.max_turns {
            return Err(ConfigError::InvalidValue {
                field: "contextWindow".to_string(),
                value: self.context_window.to_string(),
                reason: format!("must not exceed maxTurnsPerSession ({})", self.max_turns),
            }
            .into());
        }
        Ok(())
    }
}

impl From<&QueryGateConfig> for ConversationConfig {
    fn from(config: &QueryGateConfig) -> Self {
        Self {
            max_turns: config.max_turns_per_session,
            context_window: config.context_window,
        }
    }
}

// ============================================================================
// TURNS, SESSIONS AND CONTEXT
// ============================================================================

/// One question/answer pair. The text is opaque to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub timestamp: Timestamp,
}

/// A session's bounded history plus its activity timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    session_id: SessionId,
    history: VecDeque<Turn>,
    total_turns: usize,
    created_at: Timestamp,
    last_activity_at: Timestamp,
}

impl Session {
    fn new(session_id: SessionId, now: Timestamp) -> Self {
        Self {
            session_id,
            history: VecDeque::new(),
            total_turns: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Append a turn, dropping the oldest ones beyond `max_turns`.
    fn push(&mut self, turn: Turn, max_turns: usize) {
        self.last_activity_at = turn.timestamp;
        self.total_turns += 1;
        self.history.push_back(turn);
        while self.history.len() > max_turns {
            self.history.pop_front();
        }
    }

    /// Up to `limit` most recent turns, oldest first.
    fn recent(&self, limit: usize) -> Vec<Turn> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    fn is_stale_at(&self, now: Timestamp, stale_after: TimeDelta) -> bool {
        elapsed_between(self.last_activity_at, now) > stale_after
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Retained turns, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    /// Turns currently retained.
    pub fn turn_count(&self) -> usize {
        self.history.len()
    }

    /// Turns recorded over the session's lifetime, evicted ones included.
    pub fn total_turns(&self) -> usize {
        self.total_turns
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn last_activity_at(&self) -> Timestamp {
        self.last_activity_at
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            turn_count: self.history.len(),
            total_turns: self.total_turns,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

/// Recent turns split into parallel lists, as handed to the AI service.
///
/// `conversation_length` counts every turn recorded in the session, including
/// those already dropped from the bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub previous_questions: Vec<String>,
    pub previous_answers: Vec<String>,
    pub conversation_length: usize,
}

impl ConversationContext {
    fn from_turns(window: &[Turn], conversation_length: usize) -> Self {
        let (previous_questions, previous_answers) = window
            .iter()
            .map(|turn| (turn.question.clone(), turn.answer.clone()))
            .unzip();
        Self {
            previous_questions,
            previous_answers,
            conversation_length,
        }
    }
}

// ============================================================================
// INTROSPECTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub turn_count: usize,
    pub total_turns: usize,
    pub created_at: Timestamp,
    pub last_activity_at: Timestamp,
}

/// Store-wide view for the metrics surface. Sessions are sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub active_session_count: usize,
    pub sessions: Vec<SessionSummary>,
}

/// Result of one staleness sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapOutcome {
    /// Sessions inspected by the snapshot pass.
    pub examined: usize,
    /// Sessions actually removed.
    pub evicted: Vec<SessionId>,
}

impl ReapOutcome {
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }
}

// ============================================================================
// CONVERSATION STORE
// ============================================================================

/// Per-session conversation memory.
///
/// Callers only ever receive copies; nothing returned by the store aliases
/// its internal history.
#[derive(Debug)]
pub struct ConversationStore {
    sessions: DashMap<SessionId, Session>,
    config: ConversationConfig,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    /// Create a store using the system clock.
    pub fn new(config: ConversationConfig) -> QueryGateResult<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Create a store reading time from `clock`.
    pub fn with_clock(config: ConversationConfig, clock: Arc<dyn Clock>) -> QueryGateResult<Self> {
        config.validate()?;
        Ok(Self {
            sessions: DashMap::new(),
            config,
            clock,
        })
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Create the session if absent. Referencing an existing id is a no-op.
    pub fn ensure_session(&self, session_id: &SessionId) -> SessionId {
        self.sessions.entry(session_id.clone()).or_insert_with(|| {
            debug!(session_id = %session_id, "Created conversation session");
            Session::new(session_id.clone(), self.clock.now())
        });
        session_id.clone()
    }

    /// Append a turn, creating the session on first use.
    ///
    /// The append, the FIFO trim and the activity update happen under the
    /// session's shard lock, so concurrent calls on one session apply in
    /// some serial order.
    pub fn record_turn(
        &self,
        session_id: &SessionId,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) {
        let now = self.clock.now();
        let turn = Turn {
            question: question.into(),
            answer: answer.into(),
            timestamp: now,
        };

        let mut session = self.sessions.entry(session_id.clone()).or_insert_with(|| {
            debug!(session_id = %session_id, "Created conversation session");
            Session::new(session_id.clone(), now)
        });
        session.push(turn, self.config.max_turns);
        debug!(
            session_id = %session_id,
            turn_count = session.turn_count(),
            "Recorded conversation turn"
        );
    }

    /// Up to `limit` most recent turns, oldest first. Unknown sessions yield
    /// an empty list.
    pub fn recent_turns(&self, session_id: &SessionId, limit: usize) -> Vec<Turn> {
        self.sessions
            .get(session_id)
            .map(|session| session.recent(limit))
            .unwrap_or_default()
    }

    /// The five most recent turns.
    pub fn history(&self, session_id: &SessionId) -> Vec<Turn> {
        self.recent_turns(session_id, DEFAULT_HISTORY_LIMIT)
    }

    /// Context for the AI service, or `None` when the session is unknown or
    /// has no turns yet.
    pub fn build_context(&self, session_id: &SessionId) -> Option<ConversationContext> {
        let session = self.sessions.get(session_id)?;
        if session.turn_count() == 0 {
            return None;
        }
        let window = session.recent(self.config.context_window);
        Some(ConversationContext::from_turns(&window, session.total_turns()))
    }

    /// Delete a session. Returns `true` if it existed.
    pub fn forget(&self, session_id: &SessionId) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!(session_id = %session_id, "Forgot conversation session");
        }
        removed
    }

    /// Copy of a session, if present.
    pub fn snapshot(&self, session_id: &SessionId) -> Option<Session> {
        self.sessions.get(session_id).map(|session| session.clone())
    }

    pub fn session_summary(&self, session_id: &SessionId) -> Option<SessionSummary> {
        self.sessions.get(session_id).map(|session| session.summary())
    }

    pub fn stats(&self) -> ConversationStats {
        let mut sessions: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|entry| entry.value().summary())
            .collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        ConversationStats {
            active_session_count: sessions.len(),
            sessions,
        }
    }

    /// Evict every session idle for longer than `stale_after`.
    ///
    /// Candidates are collected first and the iteration guards dropped.
    /// Each removal then re-checks staleness under that session's lock, so a
    /// session touched in between survives and only one shard is ever held
    /// at a time.
    pub fn reap_stale(&self, stale_after: Duration) -> ReapOutcome {
        let now = self.clock.now();
        // Durations beyond chrono's range mean nothing can be stale yet.
        let threshold = TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::MAX);

        let mut examined = 0;
        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .inspect(|_| examined += 1)
            .filter(|entry| entry.value().is_stale_at(now, threshold))
            .map(|entry| entry.key().clone())
            .collect();

        let evicted: Vec<SessionId> = candidates
            .into_iter()
            .filter(|id| {
                self.sessions
                    .remove_if(id, |_, session| session.is_stale_at(now, threshold))
                    .is_some()
            })
            .collect();

        if !evicted.is_empty() {
            debug!(examined, evicted = evicted.len(), "Reaped stale sessions");
        }
        ReapOutcome { examined, evicted }
    }

    /// Number of sessions currently held.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
