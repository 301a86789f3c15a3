//! Terminal rendering for transcript events.
//!
//! `RenderSink` is the UI contract consumed by the interactive loop, so tests
//! can substitute a recording sink without touching a real terminal.
//! `TerminalRenderer` is the default implementation: markdown through
//! `termimad`, chrome through `crossterm` styling. `EventPrinter` maps
//! [`ChatEvent`]s onto the sink, turning the idempotent full-text stream
//! updates into append-only terminal fragments.

use crate::config::DisplayConfig;
use crate::orchestrator::{ChatEvent, Phase};
use crate::types::{ChatMessage, FileRef, Role, SessionSummary, ThinkingStep, UploadState};
use crossterm::style::Stylize;
use termimad::MadSkin;

/// Injectable rendering interface used by the interactive loop.
pub trait RenderSink: Send {
    /// Echo a submitted user message with its attachments.
    fn user_message(&self, message: &ChatMessage);
    /// Render one finalized assistant message as a block.
    fn assistant_block(&self, message: &ChatMessage);
    /// Append a fragment of an in-progress streamed reply.
    fn stream_fragment(&self, fragment: &str);
    /// Close an in-progress streamed reply, with its reasoning label if any.
    fn stream_close(&self, duration_label: Option<&str>);
    /// Show the latest reasoning step while a deferred request runs.
    fn thinking(&self, step: &ThinkingStep);
    /// Show a phase transition note (awaiting, polling, streaming).
    fn phase_note(&self, phase: Phase);
    /// Render the saved-session listing.
    fn session_list(&self, sessions: &[SessionSummary]);
    /// Render the staged attachment list.
    fn staged_files(&self, files: &[FileRef]);
    /// Informational line.
    fn info(&self, text: &str);
    /// Error line.
    fn error(&self, text: &str);
}

// ---------------------------------------------------------------------------
// Terminal implementation
// ---------------------------------------------------------------------------

/// Default renderer writing to stdout/stderr.
pub struct TerminalRenderer {
    skin: MadSkin,
    color: bool,
    show_thinking: bool,
}

impl TerminalRenderer {
    pub fn new(display: &DisplayConfig) -> Self {
        let skin = if display.color {
            MadSkin::default()
        } else {
            MadSkin::no_style()
        };
        Self {
            skin,
            color: display.color,
            show_thinking: display.show_thinking,
        }
    }

    fn label(&self, text: &str) -> String {
        if self.color {
            text.to_string().bold().cyan().to_string()
        } else {
            text.to_string()
        }
    }

    fn muted(&self, text: &str) -> String {
        if self.color {
            text.to_string().dark_grey().to_string()
        } else {
            text.to_string()
        }
    }

    /// Render markdown into terminal text with structure preserved.
    fn markdown(&self, input: &str) -> String {
        let formatted = self.skin.text(input, None).to_string();
        formatted.trim_end_matches('\n').to_string()
    }
}

impl RenderSink for TerminalRenderer {
    fn user_message(&self, message: &ChatMessage) {
        println!("{} {}", self.label("you:"), message.content);
        for file in &message.attached_files {
            println!("  {}", self.muted(&format!("[attached: {}]", file.name)));
        }
    }

    fn assistant_block(&self, message: &ChatMessage) {
        if self.show_thinking {
            if let Some(label) = &message.thinking_duration {
                println!("{}", self.muted(&format!("thought for {label}")));
            }
        }
        println!("{}", self.markdown(&message.content));
        println!();
    }

    fn stream_fragment(&self, fragment: &str) {
        use std::io::Write;
        print!("{fragment}");
        let _ = std::io::stdout().flush();
    }

    fn stream_close(&self, duration_label: Option<&str>) {
        println!();
        if self.show_thinking {
            if let Some(label) = duration_label {
                println!("{}", self.muted(&format!("thought for {label}")));
            }
        }
        println!();
    }

    fn thinking(&self, step: &ThinkingStep) {
        eprintln!(
            "{}",
            self.muted(&format!("  step {}: {}", step.step, step.description))
        );
    }

    fn phase_note(&self, phase: Phase) {
        let note = match phase {
            Phase::Awaiting => "sending...",
            Phase::Polling => "working...",
            Phase::Streaming | Phase::Idle => return,
        };
        eprintln!("{}", self.muted(note));
    }

    fn session_list(&self, sessions: &[SessionSummary]) {
        if sessions.is_empty() {
            println!("{}", self.muted("no saved sessions"));
            return;
        }
        println!("{}", self.label("sessions:"));
        for session in sessions {
            println!(
                "  {}  {}  {}",
                session.session_id,
                session.title,
                self.muted(&session.timestamp)
            );
        }
    }

    fn staged_files(&self, files: &[FileRef]) {
        if files.is_empty() {
            return;
        }
        println!("{}", self.label("attached:"));
        for file in files {
            let state = match &file.state {
                UploadState::Uploading => "uploading".to_string(),
                UploadState::Uploaded { .. } => "ready".to_string(),
                UploadState::Failed { message } => format!("failed: {message}"),
            };
            println!("  {}  {}", file.name, self.muted(&state));
        }
    }

    fn info(&self, text: &str) {
        println!("{text}");
    }

    fn error(&self, text: &str) {
        eprintln!("{} {text}", self.label("error:"));
    }
}

// ---------------------------------------------------------------------------
// Event mapping
// ---------------------------------------------------------------------------

/// Stateful mapping from [`ChatEvent`]s to sink calls.
///
/// Stream updates carry the full accumulated text; this printer remembers how
/// much has been written and emits only the unseen suffix, so the terminal
/// output is append-only even though the event payload is idempotent.
pub struct EventPrinter {
    streaming: bool,
    printed: usize,
}

impl EventPrinter {
    pub fn new() -> Self {
        Self {
            streaming: false,
            printed: 0,
        }
    }

    pub fn handle(&mut self, sink: &dyn RenderSink, event: &ChatEvent) {
        match event {
            ChatEvent::UserMessage(message) => sink.user_message(message),
            ChatEvent::StreamStarted => {
                self.streaming = true;
                self.printed = 0;
            }
            ChatEvent::StreamText { text } => {
                if text.len() > self.printed {
                    sink.stream_fragment(&text[self.printed..]);
                    self.printed = text.len();
                }
            }
            ChatEvent::AssistantMessage(message) => {
                if self.streaming {
                    // Content already on screen fragment by fragment; print
                    // any tail the finalizer added, then close the block.
                    if message.content.len() > self.printed {
                        sink.stream_fragment(&message.content[self.printed..]);
                    }
                    self.streaming = false;
                    self.printed = 0;
                    sink.stream_close(message.thinking_duration.as_deref());
                } else {
                    sink.assistant_block(message);
                }
            }
            ChatEvent::ThinkingUpdate { steps } => {
                if let Some(latest) = steps.last() {
                    sink.thinking(latest);
                }
            }
            ChatEvent::PhaseChanged(phase) => sink.phase_note(*phase),
            ChatEvent::SessionsRefreshed(sessions) => sink.session_list(sessions),
            ChatEvent::TranscriptReplaced(transcript) => {
                for message in transcript {
                    match message.role {
                        Role::User => sink.user_message(message),
                        Role::Assistant => sink.assistant_block(message),
                    }
                }
            }
            ChatEvent::StagedFilesChanged(files) => sink.staged_files(files),
        }
    }
}

impl Default for EventPrinter {
    fn default() -> Self {
        Self::new()
    }
}
