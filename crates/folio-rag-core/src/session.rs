//! Conversation history per session.
//!
//! The chat pipeline only depends on [`HistoryStore`]; the in-memory
//! implementation keeps the last `max_history_length` exchanges of each
//! session and forgets sessions idle for longer than `expiry`.
//! Concurrent appends to the same session are last-write-wins.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use crate::intent::Intent;
use crate::models::ConversationExchange;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Exchanges for `session_id`, oldest first. Unknown sessions are empty.
    async fn history(&self, session_id: &str) -> Result<Vec<ConversationExchange>>;

    /// Record an exchange, updating the session's topic from its intent.
    async fn append(&self, session_id: &str, exchange: ConversationExchange) -> Result<()>;

    /// Intent of the most recent non-general exchange.
    async fn current_topic(&self, session_id: &str) -> Result<Option<Intent>>;

    /// Forget a session entirely.
    async fn clear(&self, session_id: &str) -> Result<()>;
}

struct SessionState {
    history: Vec<ConversationExchange>,
    current_topic: Option<Intent>,
    last_active: Instant,
}

impl SessionState {
    fn new(now: Instant) -> Self {
        Self {
            history: Vec::new(),
            current_topic: None,
            last_active: now,
        }
    }
}

pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
    max_history_length: usize,
    expiry: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(3600))
    }
}

impl InMemorySessionStore {
    pub fn new(max_history_length: usize, expiry: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_history_length,
            expiry,
        }
    }

    /// Lock the table after dropping idle sessions.
    fn live_sessions(&self, now: Instant) -> MutexGuard<'_, HashMap<String, SessionState>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        let expiry = self.expiry;
        sessions.retain(|_, s| now.saturating_duration_since(s.last_active) <= expiry);
        let expired = before - sessions.len();
        if expired > 0 {
            tracing::debug!(expired, "dropped idle sessions");
        }
        sessions
    }

    fn history_at(&self, session_id: &str, now: Instant) -> Vec<ConversationExchange> {
        let mut sessions = self.live_sessions(now);
        match sessions.get_mut(session_id) {
            Some(state) => {
                state.last_active = now;
                state.history.clone()
            }
            None => Vec::new(),
        }
    }

    fn append_at(&self, session_id: &str, exchange: ConversationExchange, now: Instant) {
        let mut sessions = self.live_sessions(now);
        let state = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(now));
        state.last_active = now;
        if let Some(intent) = exchange.intent.filter(|i| *i != Intent::General) {
            state.current_topic = Some(intent);
        }
        state.history.push(exchange);
        if state.history.len() > self.max_history_length {
            let excess = state.history.len() - self.max_history_length;
            state.history.drain(..excess);
        }
        tracing::debug!(session_id, history = state.history.len(), "session updated");
    }

    fn current_topic_at(&self, session_id: &str, now: Instant) -> Option<Intent> {
        self.live_sessions(now)
            .get(session_id)
            .and_then(|s| s.current_topic)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.live_sessions(Instant::now()).len()
    }
}

#[async_trait]
impl HistoryStore for InMemorySessionStore {
    async fn history(&self, session_id: &str) -> Result<Vec<ConversationExchange>> {
        Ok(self.history_at(session_id, Instant::now()))
    }

    async fn append(&self, session_id: &str, exchange: ConversationExchange) -> Result<()> {
        self.append_at(session_id, exchange, Instant::now());
        Ok(())
    }

    async fn current_topic(&self, session_id: &str) -> Result<Option<Intent>> {
        Ok(self.current_topic_at(session_id, Instant::now()))
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        Ok(())
    }
}
