//! Workflow orchestrator split into focused submodules.
//!
//! The [`WorkflowOrchestrator`] drives one batch of invoice files through four
//! steps: upload, configure, processing and done.
//! - [`state`] - Step data, flags and the observer-facing snapshot
//! - [`actions`] - User-triggered transitions
//! - [`polling`] - The status polling loop bound to a submitted job
//! - [`lifecycle`] - Shutdown coordination

mod actions;
mod lifecycle;
mod polling;
mod state;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use state::WorkflowSnapshot;

use crate::client::{Collaborators, ProgressCallback};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Event, Step};
use state::{Phase, WorkflowState};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives the upload, configure, processing and done steps for one batch
///
/// The orchestrator is cheap to clone; clones share the same state, event
/// channel and collaborators. All mutation happens behind a single mutex, and
/// every action checks the current step before touching anything.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    pub(crate) state: Arc<Mutex<WorkflowState>>,
    pub(crate) collaborators: Collaborators,
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Written from the synchronous upload progress callback
    pub(crate) upload_progress: Arc<AtomicU8>,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator driving the given collaborators
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration fails validation.
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::debug!(
            base_url = %config.api.base_url,
            polling_interval_ms = config.polling.interval.as_millis(),
            "Workflow orchestrator created"
        );

        Ok(Self {
            state: Arc::new(Mutex::new(WorkflowState::new())),
            collaborators,
            config: Arc::new(config),
            event_tx,
            upload_progress: Arc::new(AtomicU8::new(0)),
        })
    }

    /// Create an orchestrator backed by the HTTP processing API
    pub fn with_http(config: Config) -> Result<Self> {
        let collaborators = Collaborators::http(&config)?;
        Self::new(config, collaborators)
    }

    /// Subscribe to workflow events
    ///
    /// Each subscriber receives every event emitted after it subscribed.
    /// Slow subscribers may miss events and see a `Lagged` error.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current state of the workflow
    pub async fn snapshot(&self) -> WorkflowSnapshot {
        let state = self.state.lock().await;
        state.snapshot(self.upload_progress.load(Ordering::SeqCst))
    }

    /// Current step
    pub async fn step(&self) -> Step {
        self.state.lock().await.phase.step()
    }

    /// Configuration the orchestrator was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Emit an event, ignoring the error when nobody is listening
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Replace the phase, announcing the step change if there is one
    pub(crate) fn transition(&self, state: &mut WorkflowState, phase: Phase) {
        let from = state.phase.step();
        let to = phase.step();
        state.phase = phase;
        if from != to {
            tracing::info!(%from, %to, "Workflow step changed");
            self.emit_event(Event::StepChanged { from, to });
        }
    }

    /// Record `error` as the workflow's current error and hand it back
    pub(crate) fn record_error(&self, state: &mut WorkflowState, error: Error) -> Error {
        let message = error.to_string();
        self.emit_event(Event::ErrorRaised {
            code: error.error_code().to_string(),
            message: message.clone(),
        });
        state.error = Some(message);
        error
    }

    /// Progress callback for one upload, muted once `run` is cancelled
    pub(crate) fn upload_progress_callback(&self, run: CancellationToken) -> ProgressCallback {
        let progress = self.upload_progress.clone();
        let event_tx = self.event_tx.clone();
        Arc::new(move |sent: u64, total: u64| {
            if run.is_cancelled() {
                return;
            }
            let percent = if total == 0 {
                100
            } else {
                ((sent.min(total) as f64 / total as f64) * 100.0).round() as u8
            };
            let previous = progress.swap(percent, Ordering::SeqCst);
            if previous != percent {
                event_tx.send(Event::UploadProgress { percent }).ok();
            }
        })
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("base_url", &self.config.api.base_url)
            .finish_non_exhaustive()
    }
}
