use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{ConversationTurn, GenieSession};

/// Per-session state: append-only history plus the active Genie
/// conversation. Lives only as long as the process; a browser tab that goes
/// away simply leaves its entry to die with the server.
#[derive(Debug, Default)]
pub struct SessionState {
    history: Vec<ConversationTurn>,
    genie: Option<GenieSession>,
}

impl SessionState {
    pub fn append(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn genie_session(&self) -> Option<&GenieSession> {
        self.genie.as_ref()
    }

    pub fn set_genie_session(&mut self, session: GenieSession) {
        self.genie = Some(session);
    }
}

/// In-memory store of all live sessions. Each session sits behind its own
/// async mutex, which is what enforces "at most one outstanding Genie query
/// per session": a second message on the same session waits for the first
/// turn to resolve. History is unbounded on purpose (session = one browser
/// tab).
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh session id for a client that arrived without one.
    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Fetch the session, creating it on first sight.
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(session_id) {
                return session.clone();
            }
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id, "Creating session");
                Arc::new(Mutex::new(SessionState::default()))
            })
            .clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn history_grows_two_per_exchange_in_order() {
        let store = SessionStore::new();
        let session = store.get_or_create("s1").await;

        let n = 5;
        for i in 0..n {
            let mut state = session.lock().await;
            state.append(ConversationTurn::user(format!("question {i}")));
            state.append(ConversationTurn::assistant(format!("answer {i}")));
        }

        let state = session.lock().await;
        assert_eq!(state.history().len(), 2 * n);
        for (i, pair) in state.history().chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].text, format!("question {i}"));
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].text, format!("answer {i}"));
        }
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.get_or_create("a").await;
        let b = store.get_or_create("b").await;

        a.lock().await.append(ConversationTurn::user("hello from a"));

        assert_eq!(a.lock().await.history().len(), 1);
        assert!(b.lock().await.history().is_empty());
        assert_eq!(store.session_count().await, 2);
    }

    #[tokio::test]
    async fn get_or_create_returns_same_session() {
        let store = SessionStore::new();
        let first = store.get_or_create("s").await;
        first.lock().await.append(ConversationTurn::user("hi"));

        let second = store.get_or_create("s").await;
        assert_eq!(second.lock().await.history().len(), 1);
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn genie_session_is_reused_once_set() {
        let store = SessionStore::new();
        let session = store.get_or_create("s").await;

        assert!(session.lock().await.genie_session().is_none());

        session.lock().await.set_genie_session(GenieSession {
            conversation_id: "conv-1".to_string(),
        });

        let state = session.lock().await;
        assert_eq!(
            state.genie_session().map(|g| g.conversation_id.as_str()),
            Some("conv-1")
        );
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionStore::new_session_id(), SessionStore::new_session_id());
    }
}
