//! Custom test assertions for integration tests

use invoice_workflow::{Event, Step, WorkflowOrchestrator};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;

/// Result of waiting for a step
#[derive(Debug)]
pub enum WaitResult {
    /// The workflow entered the step
    Reached,
    /// Polling stopped without a terminal status
    PollingStopped(String),
    /// Timeout waiting for the step
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a `StepChanged` event into `step`
///
/// Pass a receiver obtained before the action that triggers the transition,
/// so the event cannot be missed.
pub async fn wait_for_step(events: &mut Receiver<Event>, step: Step, timeout: Duration) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::StepChanged { to, .. }) if to == step => {
                    return WaitResult::Reached;
                }
                Ok(Event::PollingStopped { reason, .. }) => {
                    return WaitResult::PollingStopped(reason);
                }
                Ok(_) => {
                    // Other events, continue waiting
                }
                Err(RecvError::Lagged(n)) => {
                    eprintln!("Warning: lagged {} events", n);
                }
                Err(RecvError::Closed) => {
                    return WaitResult::ChannelClosed;
                }
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait until polling has stopped for whatever reason
pub async fn wait_until_idle(workflow: &WorkflowOrchestrator, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !workflow.snapshot().await.is_polling {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Collect every event already buffered in `events`
pub fn drain(events: &mut Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}
