//! Data model shared between the transport, orchestrator, and renderer.
//!
//! Wire-facing types serialize/deserialize directly to/from the JSON payloads
//! exposed by the agent backend.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message roles
// ---------------------------------------------------------------------------

/// Conversation participant role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user message.
    User,
    /// Assistant/agent message.
    Assistant,
}

// ---------------------------------------------------------------------------
// Reasoning steps
// ---------------------------------------------------------------------------

/// One intermediate reasoning annotation published by the agent while a
/// deferred request is running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThinkingStep {
    /// 1-based step index as reported by the backend feed.
    pub step: u32,
    /// Human-readable description of the unit of work.
    pub description: String,
}

/// Derived transcript label for a finished set of reasoning steps.
pub fn thinking_duration_label(steps: &[ThinkingStep]) -> Option<String> {
    if steps.is_empty() {
        None
    } else {
        Some(format!("{} steps", steps.len()))
    }
}

// ---------------------------------------------------------------------------
// Processing status
// ---------------------------------------------------------------------------

/// Polled completion-status snapshot for a deferred request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessingStatus {
    pub is_processing: bool,
    pub has_result: bool,
}

impl ProcessingStatus {
    /// True for the unique completion transition: a result exists and the
    /// backend is no longer processing.
    pub fn is_complete(&self) -> bool {
        self.has_result && !self.is_processing
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

/// Upload lifecycle for a staged attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "state")]
pub enum UploadState {
    /// Upload request is in flight.
    Uploading,
    /// Stored on the backend under `server_path`.
    Uploaded { server_path: String },
    /// Upload failed; the file cannot be referenced by a prompt.
    Failed { message: String },
}

/// A file attached (or being attached) to the next prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub mime_type: String,
    #[serde(flatten)]
    pub state: UploadState,
}

impl FileRef {
    /// Attachment that still has an upload in flight.
    pub fn uploading(name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            state: UploadState::Uploading,
        }
    }

    /// Reference to a document already resident on the backend, attachable
    /// without an upload.
    pub fn from_model_file(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            mime_type: "application/pdf".to_string(),
            state: UploadState::Uploaded {
                server_path: name.clone(),
            },
            name,
        }
    }

    /// True once the backend holds the file and it can be sent.
    pub fn is_uploaded(&self) -> bool {
        matches!(self.state, UploadState::Uploaded { .. })
    }
}

// ---------------------------------------------------------------------------
// Transcript messages
// ---------------------------------------------------------------------------

/// A single transcript entry.
///
/// Assistant entries start as an empty placeholder when the reply streams and
/// become immutable once finalized; at most one assistant entry is open for
/// streaming mutation at any time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Files attached to a user message, frozen at submit time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attached_files: Vec<FileRef>,
    /// Reasoning steps attached to a finished assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thinking_steps: Vec<ThinkingStep>,
    /// Display label derived from the attached steps, e.g. `"4 steps"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_duration: Option<String>,
}

impl ChatMessage {
    /// Create a user message with a frozen attachment list.
    pub fn user(content: impl Into<String>, attached_files: Vec<FileRef>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attached_files,
            thinking_steps: Vec::new(),
            thinking_duration: None,
        }
    }

    /// Create an assistant message without reasoning steps.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::assistant_with_steps(content, Vec::new())
    }

    /// Create an assistant message carrying a frozen reasoning-step snapshot.
    pub fn assistant_with_steps(content: impl Into<String>, steps: Vec<ThinkingStep>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attached_files: Vec::new(),
            thinking_duration: thinking_duration_label(&steps),
            thinking_steps: steps,
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Listing metadata for one saved conversation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    /// Opaque stable identifier.
    pub session_id: String,
    /// Display title; backend falls back to the first user message until a
    /// generated title exists.
    pub title: String,
    /// Creation timestamp as an opaque ISO string; ordering is trusted as
    /// returned by the backend (most recent first).
    pub timestamp: String,
}
