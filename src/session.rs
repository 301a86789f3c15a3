//! Saved-session lifecycle: list, save, load, delete, and new-chat reset.
//!
//! Session operations run against the same transport as chat traffic but are
//! serialized through this manager so the active-session id, the backend
//! conversation state, and the local transcript never disagree. Any in-flight
//! request is discarded before the transcript is swapped.

use crate::api::AgentTransport;
use crate::error::ApiError;
use crate::orchestrator::{ChatEvent, Orchestrator};
use crate::poller::relock;
use crate::types::SessionSummary;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Coordinator for saved-session operations.
pub struct SessionManager {
    transport: Arc<dyn AgentTransport>,
    orchestrator: Arc<Orchestrator>,
    events: mpsc::UnboundedSender<ChatEvent>,
    /// Backend session id the transcript currently belongs to, if saved.
    active_session: Mutex<Option<String>>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        orchestrator: Arc<Orchestrator>,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Self {
        Self {
            transport,
            orchestrator,
            events,
            active_session: Mutex::new(None),
        }
    }

    /// Session id the current transcript is saved under, if any.
    pub fn active_session(&self) -> Option<String> {
        relock(&self.active_session).clone()
    }

    /// Adopt the session the backend still considers active, e.g. after a
    /// client restart against a live backend.
    pub async fn adopt_backend_session(&self) -> Result<(), ApiError> {
        if let Some(session_id) = self.transport.current_session().await? {
            debug!(session_id = %session_id, "adopting backend session");
            *relock(&self.active_session) = Some(session_id);
        }
        Ok(())
    }

    /// Re-fetch the saved-session listing and publish it.
    pub async fn refresh(&self) -> Result<Vec<SessionSummary>, ApiError> {
        let sessions = self.transport.list_sessions().await?;
        let _ = self
            .events
            .send(ChatEvent::SessionsRefreshed(sessions.clone()));
        Ok(sessions)
    }

    /// Start a fresh conversation: discard local and backend state.
    pub async fn new_session(&self) -> Result<(), ApiError> {
        self.orchestrator.reset();
        *relock(&self.active_session) = None;
        self.transport.new_chat().await?;
        let _ = self.events.send(ChatEvent::TranscriptReplaced(Vec::new()));
        Ok(())
    }

    /// Persist the current conversation; returns its session id.
    pub async fn save(&self) -> Result<String, ApiError> {
        let session_id = self.transport.save_session().await?;
        *relock(&self.active_session) = Some(session_id.clone());
        if let Err(err) = self.refresh().await {
            // The save itself succeeded; a stale listing is tolerable.
            warn!(error = %err, "session listing refresh failed after save");
        }
        Ok(session_id)
    }

    /// Load a saved session, replacing the transcript wholesale.
    ///
    /// The in-flight request (if any) is discarded before the fetch so a
    /// late reply can never mutate the restored history.
    pub async fn load(&self, session_id: &str) -> Result<(), ApiError> {
        self.orchestrator.reset();
        let history = self.transport.load_session(session_id).await?;
        self.orchestrator.replace_transcript(history.clone());
        *relock(&self.active_session) = Some(session_id.to_string());
        let _ = self.events.send(ChatEvent::TranscriptReplaced(history));
        Ok(())
    }

    /// Delete a saved session. Deleting the active one keeps the transcript
    /// on screen but detaches it from any saved identity.
    pub async fn delete(&self, session_id: &str) -> Result<(), ApiError> {
        self.transport.delete_session(session_id).await?;
        {
            let mut active = relock(&self.active_session);
            if active.as_deref() == Some(session_id) {
                *active = None;
            }
        }
        if let Err(err) = self.refresh().await {
            warn!(error = %err, "session listing refresh failed after delete");
        }
        Ok(())
    }
}
