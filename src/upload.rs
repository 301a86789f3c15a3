//! Attachment staging: local file uploads and backend-resident documents.
//!
//! A staged file appears immediately in `uploading` state and transitions to
//! `uploaded` or `failed` when the transfer settles. Only uploaded files are
//! worth referencing from a prompt; failed ones stay visible so the user can
//! see what went wrong and detach them.

use crate::api::AgentTransport;
use crate::error::ChatError;
use crate::orchestrator::Orchestrator;
use crate::types::{FileRef, UploadState};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attachment coordinator bound to the active conversation.
pub struct Uploader {
    transport: Arc<dyn AgentTransport>,
    orchestrator: Arc<Orchestrator>,
}

impl Uploader {
    pub fn new(transport: Arc<dyn AgentTransport>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            transport,
            orchestrator,
        }
    }

    /// Stage a local file and upload it to backend storage.
    ///
    /// The staged entry is visible in `uploading` state for the duration of
    /// the transfer. On failure the entry flips to `failed` and the error is
    /// also returned so the caller can report it.
    pub async fn attach_path(&self, path: &Path) -> Result<(), ChatError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ChatError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", path.display()),
                ))
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        let mime_type = mime_type_for(&name);

        // Re-attaching a name replaces the previous entry.
        self.orchestrator.remove_staged(&name);
        self.orchestrator
            .stage_file(FileRef::uploading(name.clone(), mime_type));
        match self.transport.upload_file(&name, mime_type, bytes).await {
            Ok(receipt) => {
                debug!(name = %name, server_path = %receipt.server_path, "file uploaded");
                self.orchestrator.update_staged(
                    &name,
                    UploadState::Uploaded {
                        server_path: receipt.server_path,
                    },
                );
                Ok(())
            }
            Err(err) => {
                warn!(name = %name, error = %err, "file upload failed");
                self.orchestrator.update_staged(
                    &name,
                    UploadState::Failed {
                        message: err.to_string(),
                    },
                );
                Err(ChatError::Api(err))
            }
        }
    }

    /// Stage a document already resident on the backend; no transfer needed.
    pub fn attach_resident(&self, name: &str) {
        self.orchestrator.remove_staged(name);
        self.orchestrator.stage_file(FileRef::from_model_file(name));
    }

    /// List documents resident on the backend, attachable by name.
    pub async fn resident_files(&self) -> Result<Vec<String>, ChatError> {
        Ok(self.transport.list_model_files().await?)
    }
}

/// Content type guessed from the file extension; the backend mostly cares
/// about PDFs, everything else degrades to a generic binary type.
pub fn mime_type_for(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("html") | Some("htm") => "text/html",
        _ => "application/octet-stream",
    }
}
