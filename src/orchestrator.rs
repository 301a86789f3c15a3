//! The chat orchestration core.
//!
//! One submitted prompt moves through `idle -> awaiting -> {idle | streaming
//! -> idle | polling -> streaming -> idle | polling -> idle}`. The user
//! message is appended synchronously before any network activity; the reply
//! is classified as immediate JSON, an incremental stream, or a deferred
//! token that starts the dual poller. Errors are absorbed into `idle` behind
//! a fixed apology message, and superseded request contexts lose the right to
//! mutate the transcript the moment they are invalidated.

use crate::api::{AgentTransport, ChunkSource, FinalResult, PromptReply};
use crate::poller::{relock, wait_for_cancellation, DualPoller, PollIntervals, RequestContext};
use crate::stream;
use crate::types::{ChatMessage, FileRef, SessionSummary, ThinkingStep, UploadState};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Fixed assistant reply surfaced for any request failure.
pub const APOLOGY_REPLY: &str = "Sorry, something went wrong.";

/// Orchestration phase for the active request, `Idle` between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Prompt dispatched, reply not yet classified.
    Awaiting,
    /// Deferred request; dual poller running.
    Polling,
    /// Consuming a chunked result stream.
    Streaming,
}

/// Transcript and lifecycle notifications delivered to the renderer.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    UserMessage(ChatMessage),
    /// Finalized assistant entry (also emitted for the apology reply).
    AssistantMessage(ChatMessage),
    StreamStarted,
    /// Full accumulated stream text; an idempotent replacement, not a delta.
    StreamText { text: String },
    /// Latest reasoning-step snapshot for the in-flight request.
    ThinkingUpdate { steps: Vec<ThinkingStep> },
    PhaseChanged(Phase),
    SessionsRefreshed(Vec<SessionSummary>),
    /// Transcript swapped wholesale (session load or reset).
    TranscriptReplaced(Vec<ChatMessage>),
    StagedFilesChanged(Vec<FileRef>),
}

/// State mutated only under the orchestrator's lock.
struct Shared {
    transcript: Vec<ChatMessage>,
    staged: Vec<FileRef>,
    /// Index of the assistant placeholder currently open for streaming
    /// mutation; at most one exists at a time.
    open_placeholder: Option<usize>,
    phase: Phase,
}

/// Owner of the per-request lifecycle and the active transcript.
pub struct Orchestrator {
    transport: Arc<dyn AgentTransport>,
    shared: Mutex<Shared>,
    events: mpsc::UnboundedSender<ChatEvent>,
    intervals: PollIntervals,
    /// Context of the in-flight request, if any; at most one per session.
    active: Mutex<Option<Arc<RequestContext>>>,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        events: mpsc::UnboundedSender<ChatEvent>,
        intervals: PollIntervals,
    ) -> Self {
        Self {
            transport,
            shared: Mutex::new(Shared {
                transcript: Vec::new(),
                staged: Vec::new(),
                open_placeholder: None,
                phase: Phase::Idle,
            }),
            events,
            intervals,
            active: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> Phase {
        relock(&self.shared).phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == Phase::Idle
    }

    pub fn message_count(&self) -> usize {
        relock(&self.shared).transcript.len()
    }

    /// Snapshot of the active transcript.
    pub fn transcript(&self) -> Vec<ChatMessage> {
        relock(&self.shared).transcript.clone()
    }

    /// Snapshot of the staged attachment list.
    pub fn staged_files(&self) -> Vec<FileRef> {
        relock(&self.shared).staged.clone()
    }

    /// Stage an attachment for the next prompt.
    pub fn stage_file(&self, file: FileRef) {
        let staged = {
            let mut shared = relock(&self.shared);
            shared.staged.push(file);
            shared.staged.clone()
        };
        let _ = self.events.send(ChatEvent::StagedFilesChanged(staged));
    }

    /// Update the upload state of a staged attachment by name.
    pub fn update_staged(&self, name: &str, state: UploadState) -> bool {
        let (found, staged) = {
            let mut shared = relock(&self.shared);
            let found = match shared.staged.iter_mut().find(|f| f.name == name) {
                Some(file) => {
                    file.state = state;
                    true
                }
                None => false,
            };
            (found, shared.staged.clone())
        };
        if found {
            let _ = self.events.send(ChatEvent::StagedFilesChanged(staged));
        }
        found
    }

    /// Remove a staged attachment by name.
    pub fn remove_staged(&self, name: &str) -> bool {
        let (removed, staged) = {
            let mut shared = relock(&self.shared);
            let before = shared.staged.len();
            shared.staged.retain(|f| f.name != name);
            (shared.staged.len() != before, shared.staged.clone())
        };
        if removed {
            let _ = self.events.send(ChatEvent::StagedFilesChanged(staged));
        }
        removed
    }

    /// Invalidate the in-flight request context, if any.
    ///
    /// The superseded context's placeholder is discarded (not finalized) and
    /// the phase drops to `Idle` unconditionally. Network calls the dead
    /// context already issued are ignored when they return.
    pub fn invalidate_active(&self) {
        if let Some(ctx) = relock(&self.active).take() {
            ctx.kill();
        }
        let phase_changed = {
            let mut shared = relock(&self.shared);
            if let Some(idx) = shared.open_placeholder.take() {
                if idx < shared.transcript.len() {
                    shared.transcript.remove(idx);
                }
            }
            let changed = shared.phase != Phase::Idle;
            shared.phase = Phase::Idle;
            changed
        };
        if phase_changed {
            let _ = self.events.send(ChatEvent::PhaseChanged(Phase::Idle));
        }
    }

    /// Invalidate and clear all per-session state (transcript, staged files).
    pub fn reset(&self) {
        self.invalidate_active();
        let mut shared = relock(&self.shared);
        shared.transcript.clear();
        shared.staged.clear();
        shared.open_placeholder = None;
    }

    /// Replace the transcript wholesale, e.g. from stored session history.
    pub fn replace_transcript(&self, transcript: Vec<ChatMessage>) {
        let mut shared = relock(&self.shared);
        shared.transcript = transcript;
        shared.open_placeholder = None;
    }

    /// Submit a prompt with whatever attachments are currently staged.
    ///
    /// Returns false (and does nothing) for whitespace-only input. The user
    /// message lands in the transcript before any network call; a prior
    /// unfinished request for this session is implicitly superseded.
    pub fn submit(self: &Arc<Self>, prompt: &str) -> bool {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return false;
        }
        self.invalidate_active();

        let (user_msg, outgoing) = {
            let mut shared = relock(&self.shared);
            let files = std::mem::take(&mut shared.staged);
            let outgoing = outgoing_message(prompt, &files);
            let user_msg = ChatMessage::user(prompt, files);
            shared.transcript.push(user_msg.clone());
            shared.phase = Phase::Awaiting;
            (user_msg, outgoing)
        };
        let _ = self.events.send(ChatEvent::UserMessage(user_msg));
        let _ = self.events.send(ChatEvent::StagedFilesChanged(Vec::new()));
        let _ = self.events.send(ChatEvent::PhaseChanged(Phase::Awaiting));

        let ctx = RequestContext::new();
        *relock(&self.active) = Some(ctx.clone());
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.drive_request(ctx, outgoing).await;
        });
        true
    }

    /// Per-request driver: dispatch, classify, and settle into `Idle`.
    async fn drive_request(&self, ctx: Arc<RequestContext>, outgoing: String) {
        match self.transport.send_prompt(&outgoing).await {
            Err(err) => {
                warn!(error = %err, "prompt dispatch failed");
                self.fail_request(&ctx);
            }
            Ok(PromptReply::Immediate(text)) => {
                self.finish_request(&ctx, ChatMessage::assistant(text));
            }
            Ok(PromptReply::Stream(mut source)) => {
                self.run_stream(&ctx, source.as_mut(), Vec::new()).await;
            }
            Ok(PromptReply::Deferred) => {
                self.run_polling(&ctx).await;
            }
        }
    }

    /// Deferred path: poll both feeds until a real final result lands.
    async fn run_polling(&self, ctx: &Arc<RequestContext>) {
        self.set_phase_guarded(ctx, Phase::Polling);
        let (complete_tx, mut complete_rx) = mpsc::unbounded_channel();
        let poller = DualPoller::start(
            self.transport.clone(),
            ctx.clone(),
            self.intervals,
            complete_tx,
            self.events.clone(),
        );
        let mut cancel_rx = ctx.cancel_rx();
        loop {
            tokio::select! {
                _ = wait_for_cancellation(&mut cancel_rx) => {
                    poller.stop();
                    return;
                }
                signal = complete_rx.recv() => {
                    if signal.is_none() {
                        // Probes exited without us; nothing more will arrive.
                        poller.stop();
                        return;
                    }
                    match self.transport.fetch_final_result().await {
                        Err(err) => {
                            warn!(error = %err, "final-result fetch failed");
                            poller.stop();
                            self.fail_request(ctx);
                            return;
                        }
                        Ok(FinalResult::Json(None)) => {
                            // Status said complete but the result is not
                            // fetchable yet; the next tick re-signals.
                            debug!("final result not ready; continuing to poll");
                        }
                        Ok(FinalResult::Json(Some(text))) => {
                            poller.stop();
                            let steps = ctx.snapshot_steps();
                            self.finish_request(
                                ctx,
                                ChatMessage::assistant_with_steps(text, steps),
                            );
                            return;
                        }
                        Ok(FinalResult::Stream(mut source)) => {
                            poller.stop();
                            let steps = ctx.snapshot_steps();
                            self.run_stream(ctx, source.as_mut(), steps).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Streaming path: open a placeholder, feed the consumer, finalize.
    async fn run_stream(
        &self,
        ctx: &Arc<RequestContext>,
        source: &mut dyn ChunkSource,
        steps: Vec<ThinkingStep>,
    ) {
        {
            let mut shared = relock(&self.shared);
            if !ctx.is_live() {
                return;
            }
            shared.transcript.push(ChatMessage::assistant(""));
            shared.open_placeholder = Some(shared.transcript.len() - 1);
            shared.phase = Phase::Streaming;
        }
        let _ = self.events.send(ChatEvent::PhaseChanged(Phase::Streaming));
        let _ = self.events.send(ChatEvent::StreamStarted);
        ctx.set_streaming(true);

        let mut cancel_rx = ctx.cancel_rx();
        let outcome = tokio::select! {
            outcome = stream::consume(source, |text| {
                let updated = {
                    let mut shared = relock(&self.shared);
                    if !ctx.is_live() {
                        return;
                    }
                    match shared.open_placeholder {
                        Some(idx) => {
                            shared.transcript[idx].content = text.to_string();
                            true
                        }
                        None => false,
                    }
                };
                if updated {
                    let _ = self.events.send(ChatEvent::StreamText {
                        text: text.to_string(),
                    });
                }
            }) => outcome,
            // Cancellation drops the reader mid-stream; the placeholder is
            // discarded by the invalidator.
            _ = wait_for_cancellation(&mut cancel_rx) => return,
        };

        if outcome.interrupted {
            warn!("result stream interrupted; keeping partial content");
        }
        let message = ChatMessage::assistant_with_steps(outcome.text, steps);
        let finalized = {
            let mut shared = relock(&self.shared);
            if !ctx.is_live() {
                return;
            }
            match shared.open_placeholder.take() {
                Some(idx) => {
                    shared.transcript[idx] = message.clone();
                    shared.phase = Phase::Idle;
                    true
                }
                None => false,
            }
        };
        if finalized {
            let _ = self.events.send(ChatEvent::AssistantMessage(message));
            let _ = self.events.send(ChatEvent::PhaseChanged(Phase::Idle));
        }
    }

    /// Append a finalized assistant message and settle into `Idle`.
    fn finish_request(&self, ctx: &Arc<RequestContext>, message: ChatMessage) {
        {
            let mut shared = relock(&self.shared);
            if !ctx.is_live() {
                return;
            }
            shared.transcript.push(message.clone());
            shared.phase = Phase::Idle;
        }
        let _ = self.events.send(ChatEvent::AssistantMessage(message));
        let _ = self.events.send(ChatEvent::PhaseChanged(Phase::Idle));
    }

    /// Failure at any phase: apology reply carrying the steps seen so far.
    fn fail_request(&self, ctx: &Arc<RequestContext>) {
        let steps = ctx.snapshot_steps();
        self.finish_request(ctx, ChatMessage::assistant_with_steps(APOLOGY_REPLY, steps));
    }

    fn set_phase_guarded(&self, ctx: &Arc<RequestContext>, phase: Phase) {
        {
            let mut shared = relock(&self.shared);
            if !ctx.is_live() {
                return;
            }
            shared.phase = phase;
        }
        let _ = self.events.send(ChatEvent::PhaseChanged(phase));
    }
}

/// Wire form of a prompt: invisible attachment references ahead of the text.
fn outgoing_message(prompt: &str, files: &[FileRef]) -> String {
    if files.is_empty() {
        return prompt.to_string();
    }
    let refs: Vec<String> = files.iter().map(|f| format!("FILE: {}", f.name)).collect();
    format!("{}\n{}", refs.join("\n"), prompt)
}
