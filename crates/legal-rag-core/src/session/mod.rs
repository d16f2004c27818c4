//! Session store (component E): process-wide, in-memory, keyed by
//! `session_id`. A sharded concurrent map gives per-key serialization: a
//! new turn for the same session_id waits for the previous turn's session
//! update to commit, because the orchestrator holds the per-session write
//! lock for the duration of a turn's session-mutating operations.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache;
use tokio::sync::RwLock;
use tracing::warn;

use crate::clarification::ClarificationState;
use crate::retrieval::Filters;

/// Turns retained for prompting.
pub const DEFAULT_HISTORY_LIMIT: usize = 1;

/// Three consecutive low-confidence turns clear routing state.
pub const LOW_CONFIDENCE_ESCALATION_LIMIT: u32 = 3;

#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub last_successful_collection: Option<String>,
    pub last_successful_doc_id: Option<String>,
    pub last_successful_confidence: Option<f32>,
    pub last_successful_filters: Filters,
    pub consecutive_low_confidence_count: u32,
    pub pending_clarification: Option<ClarificationState>,
    pub history: Vec<HistoryTurn>,
    pub history_limit: usize,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            last_successful_collection: None,
            last_successful_doc_id: None,
            last_successful_confidence: None,
            last_successful_filters: Filters::default(),
            consecutive_low_confidence_count: 0,
            pending_clarification: None,
            history: Vec::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn has_prior_success(&self) -> bool {
        self.last_successful_collection.is_some()
    }

    pub fn push_history(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.history.push(HistoryTurn {
            role: role.into(),
            content: content.into(),
        });
        while self.history.len() > self.history_limit {
            self.history.remove(0);
        }
    }

    /// Record a turn that reached `AnswerReady` with confidence ≥ 0.78.
    pub fn record_success(
        &mut self,
        collection: impl Into<String>,
        doc_id: Option<String>,
        confidence: f32,
        filters: Filters,
    ) {
        self.last_successful_collection = Some(collection.into());
        self.last_successful_doc_id = doc_id;
        self.last_successful_confidence = Some(confidence);
        self.last_successful_filters = filters;
        self.consecutive_low_confidence_count = 0;
    }

    /// Returns `true` once the low-confidence streak reached the
    /// escalation limit, at which point routing state should be cleared.
    pub fn increment_low_confidence(&mut self) -> bool {
        self.consecutive_low_confidence_count += 1;
        self.consecutive_low_confidence_count >= LOW_CONFIDENCE_ESCALATION_LIMIT
    }

    pub fn clear_routing_state(&mut self) {
        self.last_successful_collection = None;
        self.last_successful_doc_id = None;
        self.last_successful_confidence = None;
        self.last_successful_filters = Filters::default();
        self.consecutive_low_confidence_count = 0;
    }

    pub fn set_pending_clarification(&mut self, state: ClarificationState) {
        self.pending_clarification = Some(state);
    }

    pub fn consume_pending_clarification(&mut self) -> Option<ClarificationState> {
        self.pending_clarification.take()
    }
}

pub struct SessionStoreConfig {
    pub idle_ttl: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Sharded in-memory session map. Eviction-by-inactivity piggybacks on a
/// `moka::sync::Cache` TTL, while the authoritative per-session state
/// lives in the `DashMap` behind an `Arc<RwLock<Session>>` for per-key
/// serialization.
pub struct SessionStore {
    sessions: DashMap<String, Arc<RwLock<Session>>>,
    touch_cache: Cache<String, ()>,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            touch_cache: Cache::builder().time_to_idle(config.idle_ttl).build(),
        }
    }

    /// Fetches the session for `session_id`, creating a fresh one and
    /// logging a warning on miss.
    pub fn get_or_create(&self, session_id: &str) -> Arc<RwLock<Session>> {
        self.touch_cache.insert(session_id.to_string(), ());
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                warn!(session_id, "session store miss; creating fresh session");
                Arc::new(RwLock::new(Session::new(session_id)))
            })
            .clone()
    }

    /// Removes sessions whose idle TTL in the touch cache has expired.
    /// Called periodically by the owning process, not by request handlers.
    pub fn sweep_expired(&self) {
        self.touch_cache.run_pending_tasks();
        self.sessions
            .retain(|id, _| self.touch_cache.contains_key(id));
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_makes_a_fresh_session_on_miss() {
        let store = SessionStore::new(SessionStoreConfig::default());
        let session = store.get_or_create("s1");
        assert_eq!(session.read().await.session_id, "s1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_session_on_hit() {
        let store = SessionStore::new(SessionStoreConfig::default());
        let first = store.get_or_create("s1");
        {
            let mut guard = first.write().await;
            guard.record_success("c1", Some("d1".into()), 0.9, Filters::default());
        }
        let second = store.get_or_create("s1");
        assert_eq!(
            second.read().await.last_successful_collection,
            Some("c1".to_string())
        );
    }

    #[test]
    fn record_success_resets_low_confidence_streak() {
        let mut session = Session::new("s1");
        session.increment_low_confidence();
        session.increment_low_confidence();
        session.record_success("c1", None, 0.9, Filters::default());
        assert_eq!(session.consecutive_low_confidence_count, 0);
    }

    #[test]
    fn three_low_confidence_turns_trigger_clear() {
        let mut session = Session::new("s1");
        assert!(!session.increment_low_confidence());
        assert!(!session.increment_low_confidence());
        assert!(session.increment_low_confidence());
    }

    #[test]
    fn history_is_bounded_by_history_limit() {
        let mut session = Session::new("s1");
        session.push_history("user", "turn 1");
        session.push_history("user", "turn 2");
        assert_eq!(session.history.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(session.history[0].content, "turn 2");
    }

    #[test]
    fn pending_clarification_is_consumed_once() {
        let mut session = Session::new("s1");
        session.set_pending_clarification(ClarificationState::new_for_test());
        assert!(session.consume_pending_clarification().is_some());
        assert!(session.consume_pending_clarification().is_none());
    }
}
