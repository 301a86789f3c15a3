//! Per-request context and the dual out-of-band poller.
//!
//! Every submitted prompt owns one [`RequestContext`]: the liveness flag that
//! gates all shared-state mutation, the streaming flag that suppresses probe
//! fetches, and the latest reasoning-step snapshot. The [`DualPoller`] runs
//! the two periodic probes (reasoning-step feed and completion-status feed)
//! as cancellable tasks with one structural stop handle, so teardown is never
//! scattered across call sites.

use crate::api::AgentTransport;
use crate::orchestrator::ChatEvent;
use crate::types::ThinkingStep;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Probe cadences for one deferred request.
#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    /// Reasoning-step probe period (fast).
    pub step: Duration,
    /// Completion-status probe period (slower).
    pub status: Duration,
}

/// Lock that recovers from poisoning instead of propagating it; critical
/// sections here never panic while holding the guard.
pub(crate) fn relock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State owned by one submitted prompt, valid until superseded or completed.
///
/// Invalidation is cooperative: tasks check [`RequestContext::is_live`] before
/// each mutating effect, and long waits select on the cancellation signal.
pub struct RequestContext {
    cancel_tx: watch::Sender<bool>,
    streaming: AtomicBool,
    steps: Mutex<Vec<ThinkingStep>>,
}

impl RequestContext {
    pub fn new() -> Arc<Self> {
        let (cancel_tx, _) = watch::channel(false);
        Arc::new(Self {
            cancel_tx,
            streaming: AtomicBool::new(false),
            steps: Mutex::new(Vec::new()),
        })
    }

    /// Invalidate this context; all owned tasks wind down and no further
    /// transcript mutation is permitted on its behalf.
    pub fn kill(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// True while this context retains the right to mutate shared state.
    pub fn is_live(&self) -> bool {
        !*self.cancel_tx.borrow()
    }

    /// Receiver for the cancellation signal, for use in `select!` waits.
    pub fn cancel_rx(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Flag the context as consuming a stream; probes self-suppress while set.
    pub fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::SeqCst);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Replace the step snapshot wholesale; the feed is authoritative, never
    /// a delta.
    pub fn replace_steps(&self, steps: Vec<ThinkingStep>) {
        if !self.is_live() {
            return;
        }
        *relock(&self.steps) = steps;
    }

    /// Clone of the current step snapshot, frozen at the call instant.
    pub fn snapshot_steps(&self) -> Vec<ThinkingStep> {
        relock(&self.steps).clone()
    }
}

/// Wait until the watch signal flips to true (or its sender is gone).
pub async fn wait_for_cancellation(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    // Sender dropped: the owner is gone, treat as cancelled.
}

/// Two independently scheduled periodic probes with a single stop handle.
///
/// Started together, stopped together. The status probe re-sends the
/// completion notification on every tick that still observes the completed
/// state, mirroring the backend's "result may not be fetchable yet" window;
/// the orchestrator stops the poller once it lands a real result.
pub struct DualPoller {
    stop_tx: watch::Sender<bool>,
}

impl DualPoller {
    /// Spawn both probes against `transport` for the given request context.
    pub fn start(
        transport: Arc<dyn AgentTransport>,
        ctx: Arc<RequestContext>,
        intervals: PollIntervals,
        complete_tx: mpsc::UnboundedSender<()>,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        spawn_step_probe(
            transport.clone(),
            ctx.clone(),
            intervals.step,
            stop_tx.subscribe(),
            events,
        );
        spawn_status_probe(
            transport,
            ctx,
            intervals.status,
            stop_tx.subscribe(),
            complete_tx,
        );
        Self { stop_tx }
    }

    /// Cancel both probe triggers; no further fetch is issued afterwards.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Drop for DualPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_step_probe(
    transport: Arc<dyn AgentTransport>,
    ctx: Arc<RequestContext>,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<ChatEvent>,
) {
    let mut cancel_rx = ctx.cancel_rx();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = wait_for_cancellation(&mut stop_rx) => break,
                _ = wait_for_cancellation(&mut cancel_rx) => break,
                _ = ticker.tick() => {
                    if ctx.is_streaming() {
                        continue;
                    }
                    match transport.fetch_reasoning_steps().await {
                        Ok(steps) if !steps.is_empty() => {
                            // A fetch issued before stop may land after it;
                            // discard so finished messages stay frozen.
                            if *stop_rx.borrow() || !ctx.is_live() {
                                break;
                            }
                            ctx.replace_steps(steps.clone());
                            let _ = events.send(ChatEvent::ThinkingUpdate { steps });
                        }
                        // Empty feed means no update, not a reset.
                        Ok(_) => {}
                        Err(err) => {
                            debug!(error = %err, "reasoning-step probe failed; retrying next tick");
                        }
                    }
                }
            }
        }
        debug!("reasoning-step probe stopped");
    });
}

fn spawn_status_probe(
    transport: Arc<dyn AgentTransport>,
    ctx: Arc<RequestContext>,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
    complete_tx: mpsc::UnboundedSender<()>,
) {
    let mut cancel_rx = ctx.cancel_rx();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = wait_for_cancellation(&mut stop_rx) => break,
                _ = wait_for_cancellation(&mut cancel_rx) => break,
                _ = ticker.tick() => {
                    if ctx.is_streaming() {
                        continue;
                    }
                    match transport.fetch_status().await {
                        Ok(status) if status.is_complete() => {
                            if *stop_rx.borrow() || !ctx.is_live() {
                                break;
                            }
                            if complete_tx.send(()).is_err() {
                                // Orchestrator side is gone.
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(err) => {
                            debug!(error = %err, "status probe failed; retrying next tick");
                        }
                    }
                }
            }
        }
        debug!("status probe stopped");
    });
}
