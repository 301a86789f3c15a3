//! Scripted in-memory doubles for the transport seam.
//!
//! Tests queue replies per endpoint and the double serves them in order,
//! counting every fetch so assertions can verify not just what the code
//! produced but what traffic it generated (or, as important, stopped
//! generating).

use crate::api::{AgentTransport, ChunkSource, FinalResult, PromptReply, UploadReceipt};
use crate::error::ApiError;
use crate::orchestrator::ChatEvent;
use crate::types::{ChatMessage, ProcessingStatus, SessionSummary, ThinkingStep};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

fn relock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Chunk source that replays a fixed chunk sequence, optionally slowly,
/// optionally ending in a read error instead of clean exhaustion.
pub struct ScriptedChunkSource {
    chunks: VecDeque<Vec<u8>>,
    error_at_end: bool,
    delay: Option<Duration>,
}

impl ScriptedChunkSource {
    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            error_at_end: false,
            delay: None,
        }
    }

    /// Replace the clean end-of-stream with a read error.
    pub fn then_error(mut self) -> Self {
        self.error_at_end = true;
        self
    }

    /// Sleep before delivering each chunk.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ChunkSource for ScriptedChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.error_at_end => {
                Err(ApiError::InvalidResponse("scripted read failure".into()))
            }
            None => Ok(None),
        }
    }
}

/// In-memory [`AgentTransport`] driven by per-endpoint scripts.
///
/// Queued replies are served front to back. Endpoints with no queued entry
/// fall back to a benign default so probe loops can spin without scripting
/// every tick: an empty step feed, a still-processing status, a not-ready
/// final result.
#[derive(Default)]
pub struct ScriptedTransport {
    prompt_replies: Mutex<VecDeque<Result<PromptReply, ApiError>>>,
    step_snapshots: Mutex<VecDeque<Vec<ThinkingStep>>>,
    status_snapshots: Mutex<VecDeque<ProcessingStatus>>,
    last_status: Mutex<Option<ProcessingStatus>>,
    final_results: Mutex<VecDeque<Result<FinalResult, ApiError>>>,
    title_replies: Mutex<VecDeque<Result<String, ApiError>>>,
    upload_replies: Mutex<VecDeque<Result<UploadReceipt, ApiError>>>,
    save_replies: Mutex<VecDeque<Result<String, ApiError>>>,
    sessions: Mutex<Vec<SessionSummary>>,
    session_histories: Mutex<HashMap<String, Vec<ChatMessage>>>,
    current_session: Mutex<Option<String>>,
    model_files: Mutex<Vec<String>>,
    steps_always_fail: AtomicBool,

    last_prompt: Mutex<Option<String>>,
    deleted_sessions: Mutex<Vec<String>>,
    loaded_sessions: Mutex<Vec<String>>,
    titled_sessions: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, String, usize)>>,

    prompt_sends: AtomicUsize,
    step_fetches: AtomicUsize,
    status_fetches: AtomicUsize,
    final_fetches: AtomicUsize,
    session_lists: AtomicUsize,
    new_chats: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk source delivering the given text fragments in order.
    pub fn text_stream(chunks: &[&str]) -> Box<dyn ChunkSource> {
        Box::new(ScriptedChunkSource::from_chunks(
            chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
        ))
    }

    /// Like [`Self::text_stream`] but sleeping before every chunk, for tests
    /// that cancel mid-stream.
    pub fn slow_text_stream(chunks: &[&str], delay: Duration) -> Box<dyn ChunkSource> {
        Box::new(
            ScriptedChunkSource::from_chunks(
                chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            )
            .delayed(delay),
        )
    }

    // --------------------------------------------------------------------
    // Scripting
    // --------------------------------------------------------------------

    pub fn push_prompt_reply(&self, reply: Result<PromptReply, ApiError>) {
        relock(&self.prompt_replies).push_back(reply);
    }

    pub fn push_steps(&self, steps: Vec<ThinkingStep>) {
        relock(&self.step_snapshots).push_back(steps);
    }

    pub fn push_status(&self, status: ProcessingStatus) {
        relock(&self.status_snapshots).push_back(status);
    }

    pub fn push_final(&self, result: Result<FinalResult, ApiError>) {
        relock(&self.final_results).push_back(result);
    }

    pub fn push_title(&self, title: Result<String, ApiError>) {
        relock(&self.title_replies).push_back(title);
    }

    pub fn push_upload(&self, receipt: Result<UploadReceipt, ApiError>) {
        relock(&self.upload_replies).push_back(receipt);
    }

    pub fn push_save_session(&self, result: Result<String, ApiError>) {
        relock(&self.save_replies).push_back(result);
    }

    /// Every step fetch fails from now on.
    pub fn fail_steps_forever(&self) {
        self.steps_always_fail.store(true, Ordering::SeqCst);
    }

    pub fn set_sessions(&self, sessions: Vec<SessionSummary>) {
        *relock(&self.sessions) = sessions;
    }

    pub fn insert_session_history(&self, session_id: &str, history: Vec<ChatMessage>) {
        relock(&self.session_histories).insert(session_id.to_string(), history);
    }

    pub fn set_current_session(&self, session_id: Option<&str>) {
        *relock(&self.current_session) = session_id.map(str::to_string);
    }

    pub fn set_model_files(&self, names: Vec<String>) {
        *relock(&self.model_files) = names;
    }

    // --------------------------------------------------------------------
    // Observation
    // --------------------------------------------------------------------

    pub fn prompt_sends(&self) -> usize {
        self.prompt_sends.load(Ordering::SeqCst)
    }

    pub fn step_fetches(&self) -> usize {
        self.step_fetches.load(Ordering::SeqCst)
    }

    pub fn status_fetches(&self) -> usize {
        self.status_fetches.load(Ordering::SeqCst)
    }

    pub fn final_fetches(&self) -> usize {
        self.final_fetches.load(Ordering::SeqCst)
    }

    pub fn session_lists(&self) -> usize {
        self.session_lists.load(Ordering::SeqCst)
    }

    pub fn new_chats(&self) -> usize {
        self.new_chats.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        relock(&self.last_prompt).clone()
    }

    pub fn deleted_sessions(&self) -> Vec<String> {
        relock(&self.deleted_sessions).clone()
    }

    pub fn loaded_sessions(&self) -> Vec<String> {
        relock(&self.loaded_sessions).clone()
    }

    pub fn titled_sessions(&self) -> Vec<String> {
        relock(&self.titled_sessions).clone()
    }

    /// Completed uploads as `(name, mime type, byte length)`.
    pub fn uploads(&self) -> Vec<(String, String, usize)> {
        relock(&self.uploads).clone()
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn send_prompt(&self, message: &str) -> Result<PromptReply, ApiError> {
        self.prompt_sends.fetch_add(1, Ordering::SeqCst);
        *relock(&self.last_prompt) = Some(message.to_string());
        relock(&self.prompt_replies)
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::InvalidResponse("no scripted prompt reply".into())))
    }

    async fn fetch_reasoning_steps(&self) -> Result<Vec<ThinkingStep>, ApiError> {
        self.step_fetches.fetch_add(1, Ordering::SeqCst);
        if self.steps_always_fail.load(Ordering::SeqCst) {
            return Err(ApiError::InvalidResponse("scripted step failure".into()));
        }
        Ok(relock(&self.step_snapshots).pop_front().unwrap_or_default())
    }

    async fn fetch_status(&self) -> Result<ProcessingStatus, ApiError> {
        self.status_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = relock(&self.status_snapshots).pop_front() {
            *relock(&self.last_status) = Some(status);
            return Ok(status);
        }
        // Once the script runs out, the last snapshot keeps being observed;
        // a never-scripted feed reads as still processing.
        Ok(relock(&self.last_status).unwrap_or(ProcessingStatus {
            is_processing: true,
            has_result: false,
        }))
    }

    async fn fetch_final_result(&self) -> Result<FinalResult, ApiError> {
        self.final_fetches.fetch_add(1, Ordering::SeqCst);
        match relock(&self.final_results).pop_front() {
            Some(result) => result,
            None => Ok(FinalResult::Json(None)),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        self.session_lists.fetch_add(1, Ordering::SeqCst);
        Ok(relock(&self.sessions).clone())
    }

    async fn save_session(&self) -> Result<String, ApiError> {
        relock(&self.save_replies)
            .pop_front()
            .unwrap_or_else(|| Ok("session-1".into()))
    }

    async fn load_session(&self, session_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        relock(&self.loaded_sessions).push(session_id.to_string());
        relock(&self.session_histories)
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApiError::Status(404, format!("no such session: {session_id}")))
    }

    async fn new_chat(&self) -> Result<(), ApiError> {
        self.new_chats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        relock(&self.deleted_sessions).push(session_id.to_string());
        relock(&self.sessions).retain(|s| s.session_id != session_id);
        Ok(())
    }

    async fn generate_title(&self, session_id: &str) -> Result<String, ApiError> {
        relock(&self.titled_sessions).push(session_id.to_string());
        relock(&self.title_replies)
            .pop_front()
            .unwrap_or_else(|| Ok("Untitled chat".into()))
    }

    async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadReceipt, ApiError> {
        relock(&self.uploads).push((name.to_string(), mime_type.to_string(), bytes.len()));
        relock(&self.upload_replies)
            .pop_front()
            .unwrap_or_else(|| {
                Ok(UploadReceipt {
                    server_path: format!("/data/uploads/{name}"),
                    filename: name.to_string(),
                })
            })
    }

    async fn current_session(&self) -> Result<Option<String>, ApiError> {
        Ok(relock(&self.current_session).clone())
    }

    async fn list_model_files(&self) -> Result<Vec<String>, ApiError> {
        Ok(relock(&self.model_files).clone())
    }
}

/// Collect everything currently buffered on an event receiver.
pub fn drain_events(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<ChatEvent>,
) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
