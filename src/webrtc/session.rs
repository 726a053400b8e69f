//! Viewer session registry
//!
//! Pure bookkeeping: sessions are inserted once their handshake has fully
//! succeeded and removed when their transport closes. No background
//! activity of its own.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{RelayError, Result};

use super::peer::PeerSession;

/// Table of active viewer sessions keyed by session id
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<PeerSession>>>,
    /// 0 = unlimited
    max_sessions: usize,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a fully negotiated session
    pub async fn register(&self, session: Arc<PeerSession>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if self.max_sessions > 0 && sessions.len() >= self.max_sessions {
            return Err(RelayError::ServiceUnavailable(format!(
                "maximum sessions ({}) reached",
                self.max_sessions
            )));
        }

        info!(session_id = %session.id, source_id = %session.source_id, "session registered");
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    /// Look up a session by id
    pub async fn get(&self, session_id: &str) -> Option<Arc<PeerSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Remove and close a session; repeated calls are no-ops
    ///
    /// Closing drops this registry's reference, which in turn releases the
    /// session's hold on its track bridge.
    pub async fn mark_closed(&self, session_id: &str) {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => session.close().await,
            None => debug!(session_id = %session_id, "mark_closed on unknown session"),
        }
    }

    /// Number of active sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every session (shutdown path)
    pub async fn close_all(&self) {
        let drained: Vec<Arc<PeerSession>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in drained {
            session.close().await;
        }
    }
}
