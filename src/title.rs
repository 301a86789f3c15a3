//! Debounced title generation for saved sessions.
//!
//! A title request is armed when a request settles and fires only after a
//! quiet period with no further activity. Re-arming resets the timer, so a
//! rapid back-and-forth produces one title request at the end instead of one
//! per exchange. At fire time the conditions are re-checked: the scheduler
//! never titles a conversation that became busy or too short in the meantime.

use crate::api::AgentTransport;
use crate::config::TitleConfig;
use crate::orchestrator::{ChatEvent, Orchestrator};
use crate::poller::{relock, wait_for_cancellation};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Debounce scheduler for session title generation.
pub struct TitleScheduler {
    transport: Arc<dyn AgentTransport>,
    orchestrator: Arc<Orchestrator>,
    events: mpsc::UnboundedSender<ChatEvent>,
    config: TitleConfig,
    /// Cancel handle for the armed timer, if one is pending.
    pending: Mutex<Option<watch::Sender<bool>>>,
}

impl TitleScheduler {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        orchestrator: Arc<Orchestrator>,
        events: mpsc::UnboundedSender<ChatEvent>,
        config: TitleConfig,
    ) -> Self {
        Self {
            transport,
            orchestrator,
            events,
            config,
            pending: Mutex::new(None),
        }
    }

    /// Arm (or re-arm) the debounce timer for the given saved session.
    ///
    /// A `None` session id disarms instead: unsaved conversations have no
    /// identity to title.
    pub fn arm(&self, session_id: Option<String>) {
        self.cancel();
        let Some(session_id) = session_id else {
            return;
        };

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *relock(&self.pending) = Some(cancel_tx);

        let transport = self.transport.clone();
        let orchestrator = self.orchestrator.clone();
        let events = self.events.clone();
        let debounce = self.config.debounce();
        let min_messages = self.config.min_messages;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {}
                _ = wait_for_cancellation(&mut cancel_rx) => return,
            }
            if !orchestrator.is_idle() || orchestrator.message_count() < min_messages {
                debug!("title generation skipped; conversation busy or too short");
                return;
            }
            match transport.generate_title(&session_id).await {
                Ok(title) => {
                    debug!(session_id = %session_id, title = %title, "session title generated");
                    // The listing carries the new title; republish it.
                    match transport.list_sessions().await {
                        Ok(sessions) => {
                            let _ = events.send(ChatEvent::SessionsRefreshed(sessions));
                        }
                        Err(err) => {
                            warn!(error = %err, "session listing refresh failed after titling");
                        }
                    }
                }
                Err(err) => {
                    // Titling is cosmetic; never surface this to the transcript.
                    warn!(error = %err, "title generation failed");
                }
            }
        });
    }

    /// Disarm the pending timer, if any. New user activity calls this so the
    /// quiet period starts over.
    pub fn cancel(&self) {
        if let Some(cancel_tx) = relock(&self.pending).take() {
            let _ = cancel_tx.send(true);
        }
    }
}
