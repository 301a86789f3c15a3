//! Transport surface consumed by the orchestration core.
//!
//! `AgentTransport` is the seam between the client and the remote agent
//! service: orchestration code only ever talks to this trait, so tests can
//! substitute a scripted in-memory transport and the HTTP details stay
//! confined to `api::http`.

pub mod http;

use crate::error::ApiError;
use crate::types::{ChatMessage, ProcessingStatus, SessionSummary, ThinkingStep};
use async_trait::async_trait;

/// Sentinel prefix the backend uses for deferred ("agentic") replies.
pub const DEFERRED_REPLY_SENTINEL: &str = "\u{1f504} Processing";

/// A sequential source of raw body chunks for one incrementally delivered
/// response. Byte-level framing is opaque; chunks may split UTF-8 sequences.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, `None` when the source is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError>;
}

/// Classified outcome of submitting a prompt.
pub enum PromptReply {
    /// Content delivered whole in the response body.
    Immediate(String),
    /// Content delivered as a chunked text source.
    Stream(Box<dyn ChunkSource>),
    /// Deferred: the answer must be retrieved by polling the status feed.
    Deferred,
}

impl std::fmt::Debug for PromptReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate(text) => f.debug_tuple("Immediate").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Deferred => f.write_str("Deferred"),
        }
    }
}

/// Final result of a deferred request.
pub enum FinalResult {
    /// Buffered result; `None` means the backend has not produced it yet and
    /// polling should continue.
    Json(Option<String>),
    /// Result delivered as a chunked text source.
    Stream(Box<dyn ChunkSource>),
}

impl std::fmt::Debug for FinalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(text) => f.debug_tuple("Json").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Backend acknowledgement for a completed file upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Storage path assigned by the backend.
    pub server_path: String,
    /// Filename as recorded by the backend.
    pub filename: String,
}

/// Requests the orchestration core issues against the remote agent service.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Submit a prompt and classify the reply shape.
    async fn send_prompt(&self, message: &str) -> Result<PromptReply, ApiError>;

    /// Fetch the current reasoning-step snapshot for the in-flight request.
    async fn fetch_reasoning_steps(&self) -> Result<Vec<ThinkingStep>, ApiError>;

    /// Fetch the completion-status snapshot for the in-flight request.
    async fn fetch_status(&self) -> Result<ProcessingStatus, ApiError>;

    /// Fetch the final result of a completed deferred request.
    async fn fetch_final_result(&self) -> Result<FinalResult, ApiError>;

    /// List saved sessions, most recent first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError>;

    /// Persist the current conversation; returns its session id.
    async fn save_session(&self) -> Result<String, ApiError>;

    /// Load a saved session and return its stored history in chronological
    /// order.
    async fn load_session(&self, session_id: &str) -> Result<Vec<ChatMessage>, ApiError>;

    /// Reset the backend conversation state for a fresh session.
    async fn new_chat(&self) -> Result<(), ApiError>;

    /// Delete a saved session.
    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError>;

    /// Generate a display title for a saved session.
    async fn generate_title(&self, session_id: &str) -> Result<String, ApiError>;

    /// Upload one attachment to backend storage.
    async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, ApiError>;

    /// Session id the backend currently considers active, if any.
    async fn current_session(&self) -> Result<Option<String>, ApiError>;

    /// List documents already resident on the backend, attachable by name.
    async fn list_model_files(&self) -> Result<Vec<String>, ApiError>;
}

/// True when a `/chat` reply is the deferred-processing sentinel rather than
/// actual content.
pub fn is_deferred_reply(reply: &str) -> bool {
    reply.starts_with(DEFERRED_REPLY_SENTINEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_sentinel_matches_backend_phrase() {
        assert!(is_deferred_reply(
            "\u{1f504} Processing your request... This may take a moment."
        ));
    }

    #[test]
    fn ordinary_replies_are_not_deferred() {
        assert!(!is_deferred_reply("The answer is 42."));
        assert!(!is_deferred_reply(""));
        // Sentinel text mid-reply does not classify as deferred.
        assert!(!is_deferred_reply(
            "note: \u{1f504} Processing is a status phrase"
        ));
    }
}
