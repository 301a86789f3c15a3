//! Colloquy — an interactive terminal client for an asynchronous reasoning agent.
//!
//! The crate talks to a remote agent service that answers some prompts
//! immediately, streams others incrementally, and defers the rest behind a
//! "processing" token that must be polled for completion. While a deferred
//! request runs, the service publishes intermediate reasoning steps on a
//! separate feed; colloquy polls both feeds, reconciles everything into a
//! single transcript entry, and tears all of it down deterministically on
//! completion, error, or session switch.
//!
//! # Quick start
//!
//! ```no_run
//! use colloquy::api::http::HttpTransport;
//! use colloquy::config::load_config;
//! use colloquy::orchestrator::Orchestrator;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let transport = Arc::new(HttpTransport::new(&config.backend));
//! let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//! let orchestrator = Arc::new(Orchestrator::new(transport, events_tx, config.polling.intervals()));
//! orchestrator.submit("Hello!");
//! while let Some(event) = events_rx.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod render;
pub mod session;
pub mod stream;
#[cfg(test)]
pub mod testsupport;
pub mod title;
pub mod types;
pub mod upload;
