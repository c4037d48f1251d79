//! Shutdown coordination.

use crate::types::Event;
use std::time::Duration;

use super::WorkflowOrchestrator;

/// How long shutdown waits for the polling task to observe cancellation
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

impl WorkflowOrchestrator {
    /// Stop background work
    ///
    /// Cancels the polling loop and marks every in-flight request as stale,
    /// then waits briefly for the polling task to exit. The step and its data
    /// are left as they were and the busy flags are cleared; a shut-down
    /// orchestrator should be dropped.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down workflow orchestrator");

        let poll = {
            let mut state = self.state.lock().await;
            state.run.cancel();
            // In-flight actions see the cancelled run and return without
            // touching state, so their flags are cleared here.
            state.is_uploading = false;
            state.is_processing = false;
            state.is_downloading = false;
            state.poll.take()
        };

        if let Some(poll) = poll {
            let job_id = poll.job_id;
            let mut handle = poll.handle;
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {
                    tracing::debug!(job_id = %job_id, "Polling task exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Polling task ended abnormally");
                }
                Err(_) => {
                    tracing::warn!(
                        job_id = %job_id,
                        "Timeout waiting for polling task, aborting it"
                    );
                    handle.abort();
                }
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Workflow orchestrator shut down");
    }
}
