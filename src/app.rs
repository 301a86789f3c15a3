//! Interactive application loop.
//!
//! Reads input lines and transcript events concurrently: the event stream
//! keeps rendering while a request is in flight, so reasoning steps and
//! streamed fragments appear without blocking the prompt. Slash commands
//! drive session and attachment management; anything else is submitted as a
//! prompt. Any new input line disarms the pending title timer, restarting the
//! quiet period.

use crate::api::AgentTransport;
use crate::config::Config;
use crate::orchestrator::{ChatEvent, Orchestrator};
use crate::render::{EventPrinter, RenderSink};
use crate::session::SessionManager;
use crate::title::TitleScheduler;
use crate::upload::Uploader;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

const HELP_TEXT: &str = "\
commands:
  /new             start a fresh conversation
  /save            save the current conversation
  /sessions        list saved sessions
  /load <id>       load a saved session
  /delete <id>     delete a saved session
  /files           list documents available on the backend
  /attach <file>   attach a local file or a backend document
  /detach <name>   remove a staged attachment
  /help            show this help
  /quit            exit";

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    New,
    Save,
    Sessions,
    Load(String),
    Delete(String),
    Files,
    Attach(String),
    Detach(String),
    Quit,
    Unknown(String),
}

/// Parse a slash command; `None` for ordinary prompt text.
fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if !line.starts_with('/') {
        return None;
    }
    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    Some(match (name, rest) {
        ("/help", _) => Command::Help,
        ("/new", _) => Command::New,
        ("/save", _) => Command::Save,
        ("/sessions", _) => Command::Sessions,
        ("/load", id) if !id.is_empty() => Command::Load(id.to_string()),
        ("/delete", id) if !id.is_empty() => Command::Delete(id.to_string()),
        ("/files", _) => Command::Files,
        ("/attach", target) if !target.is_empty() => Command::Attach(target.to_string()),
        ("/detach", name) if !name.is_empty() => Command::Detach(name.to_string()),
        ("/quit", _) | ("/exit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    })
}

/// Interactive client wiring: orchestrator, sessions, titles, attachments.
pub struct App {
    orchestrator: Arc<Orchestrator>,
    sessions: SessionManager,
    titles: TitleScheduler,
    uploader: Uploader,
    renderer: Box<dyn RenderSink>,
    events_rx: mpsc::UnboundedReceiver<ChatEvent>,
    printer: EventPrinter,
}

impl App {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        config: &Config,
        renderer: Box<dyn RenderSink>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let orchestrator = Arc::new(Orchestrator::new(
            transport.clone(),
            events_tx.clone(),
            config.polling.intervals(),
        ));
        let sessions = SessionManager::new(transport.clone(), orchestrator.clone(), events_tx.clone());
        let titles = TitleScheduler::new(
            transport.clone(),
            orchestrator.clone(),
            events_tx,
            config.title.clone(),
        );
        let uploader = Uploader::new(transport, orchestrator.clone());
        Self {
            orchestrator,
            sessions,
            titles,
            uploader,
            renderer,
            events_rx,
            printer: EventPrinter::new(),
        }
    }

    /// Run the interactive loop until `/quit` or end of input.
    pub async fn run(&mut self) {
        if let Err(err) = self.sessions.adopt_backend_session().await {
            warn!(error = %err, "could not resolve backend session at startup");
        }
        self.renderer
            .info("connected. type a prompt, or /help for commands.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.dispatch_event(&event),
                        None => break,
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if !self.handle_line(&line).await {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            warn!(error = %err, "stdin read failed");
                            break;
                        }
                    }
                }
            }
        }
        self.orchestrator.invalidate_active();
        self.titles.cancel();
    }

    /// Submit one prompt and render events until the reply settles.
    pub async fn run_once(&mut self, prompt: &str) {
        if !self.orchestrator.submit(prompt) {
            self.renderer.error("empty prompt");
            return;
        }
        while let Some(event) = self.events_rx.recv().await {
            let finished = matches!(event, ChatEvent::AssistantMessage(_));
            self.dispatch_event(&event);
            if finished {
                break;
            }
        }
    }

    fn dispatch_event(&mut self, event: &ChatEvent) {
        self.printer.handle(self.renderer.as_ref(), event);
        // A settled reply starts the title quiet period.
        if matches!(event, ChatEvent::AssistantMessage(_)) {
            self.titles.arm(self.sessions.active_session());
        }
    }

    /// Returns false when the loop should exit.
    async fn handle_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }
        // Any input restarts the title quiet period.
        self.titles.cancel();

        let Some(command) = parse_command(line) else {
            if !self.orchestrator.submit(line) {
                self.renderer.error("empty prompt");
            }
            return true;
        };
        match command {
            Command::Help => self.renderer.info(HELP_TEXT),
            Command::New => match self.sessions.new_session().await {
                Ok(()) => self.renderer.info("started a new conversation"),
                Err(err) => self.renderer.error(&format!("new chat failed: {err}")),
            },
            Command::Save => match self.sessions.save().await {
                Ok(session_id) => self.renderer.info(&format!("saved as {session_id}")),
                Err(err) => self.renderer.error(&format!("save failed: {err}")),
            },
            Command::Sessions => {
                if let Err(err) = self.sessions.refresh().await {
                    self.renderer.error(&format!("listing failed: {err}"));
                }
            }
            Command::Load(session_id) => {
                if let Err(err) = self.sessions.load(&session_id).await {
                    self.renderer.error(&format!("load failed: {err}"));
                }
            }
            Command::Delete(session_id) => match self.sessions.delete(&session_id).await {
                Ok(()) => self.renderer.info(&format!("deleted {session_id}")),
                Err(err) => self.renderer.error(&format!("delete failed: {err}")),
            },
            Command::Files => match self.uploader.resident_files().await {
                Ok(names) if names.is_empty() => self.renderer.info("no backend documents"),
                Ok(names) => {
                    for name in names {
                        self.renderer.info(&format!("  {name}"));
                    }
                }
                Err(err) => self.renderer.error(&format!("listing failed: {err}")),
            },
            Command::Attach(target) => self.attach(&target).await,
            Command::Detach(name) => {
                if !self.orchestrator.remove_staged(&name) {
                    self.renderer.error(&format!("nothing staged as `{name}`"));
                }
            }
            Command::Quit => return false,
            Command::Unknown(text) => {
                self.renderer
                    .error(&format!("unknown command: {text} (try /help)"));
            }
        }
        true
    }

    /// Attach a local path when it exists, else a backend-resident document.
    async fn attach(&mut self, target: &str) {
        let path = Path::new(target);
        if path.is_file() {
            if let Err(err) = self.uploader.attach_path(path).await {
                self.renderer.error(&format!("attach failed: {err}"));
            }
            return;
        }
        match self.uploader.resident_files().await {
            Ok(names) if names.iter().any(|n| n == target) => {
                self.uploader.attach_resident(target);
            }
            Ok(_) => {
                self.renderer
                    .error(&format!("`{target}` is neither a local file nor a backend document"));
            }
            Err(err) => self.renderer.error(&format!("attach failed: {err}")),
        }
    }
}
