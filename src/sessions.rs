//! Viewer session tracking.
//!
//! Tracks which viewers are currently attached to a relay. A session
//! lives exactly as long as its relay loop: registered when the response
//! stream starts, ended when the viewer disconnects or the stream ends.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One connected viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSession {
    /// Unique session identifier (UUID).
    pub id: String,
    /// Client address, or "-" when unknown.
    pub client: String,
    /// Channel being watched.
    pub channel_id: u64,
    /// Variant tag of the relayed process (private tags included).
    pub variant: String,
    /// Whether this viewer owns a private transcoder instance.
    pub private: bool,
    /// Session start timestamp.
    pub started_at: DateTime<Utc>,
}

/// Thread-safe registry of connected viewers.
#[derive(Clone, Default)]
pub struct ViewerSessions {
    sessions: Arc<DashMap<String, ViewerSession>>,
}

impl ViewerSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly attached viewer and return its session id.
    pub fn register(&self, client: String, channel_id: u64, variant: String, private: bool) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = ViewerSession {
            id: session_id.clone(),
            client,
            channel_id,
            variant,
            private,
            started_at: Utc::now(),
        };

        self.sessions.insert(session_id.clone(), session);
        tracing::info!(
            session_id = %session_id,
            channel_id,
            "Viewer attached"
        );

        session_id
    }

    /// End a session when its relay finishes.
    pub fn end(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            tracing::info!(
                session_id = %session_id,
                channel_id = session.channel_id,
                duration_secs = (Utc::now() - session.started_at).num_seconds(),
                "Viewer detached"
            );
        }
    }

    pub fn snapshot(&self) -> Vec<ViewerSession> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
