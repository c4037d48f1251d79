//! Status polling bound to a submitted job.
//!
//! One loop runs per processing run. It queries immediately, then once per
//! interval, and stops when the job reaches a terminal status, when it is
//! cancelled, or when the failure or duration bound is hit. Every response is
//! applied under the state lock and only if the loop is still the one bound
//! to the workflow's current job.

use crate::error::{Error, Result};
use crate::types::{Event, JobId, JobStatus, Outcome};
use tokio_util::sync::CancellationToken;

use super::WorkflowOrchestrator;
use super::state::{ActivePoll, Phase, WorkflowState};

/// What the loop should do after a response was applied
#[derive(Debug, PartialEq, Eq)]
enum PollControl {
    Continue,
    Stop,
}

impl WorkflowOrchestrator {
    /// Spawn a polling loop for `job_id` and bind it to the workflow
    ///
    /// Any loop that was previously bound is cancelled first.
    pub(crate) fn start_polling(&self, state: &mut WorkflowState, job_id: JobId) {
        if let Some(previous) = state.poll.take() {
            previous.token.cancel();
        }

        let token = state.run.child_token();
        let handle = tokio::spawn(self.clone().poll_loop(job_id.clone(), token.clone()));

        state.is_processing = true;
        state.poll = Some(ActivePoll {
            job_id,
            token,
            handle,
        });
    }

    async fn poll_loop(self, job_id: JobId, token: CancellationToken) {
        let interval = self.config.polling.interval;
        tracing::debug!(
            job_id = %job_id,
            interval_ms = interval.as_millis(),
            "Status polling started"
        );

        loop {
            if token.is_cancelled() {
                break;
            }

            // The request itself is not raced against cancellation; a response
            // that lands after a reset is dropped by `apply_poll_result`.
            let result = self.collaborators.poller.poll(&job_id).await;

            if self.apply_poll_result(&job_id, &token, result).await == PollControl::Stop {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::debug!(job_id = %job_id, "Status polling stopped");
    }

    /// Apply one poll response if the loop is still bound to the workflow
    async fn apply_poll_result(
        &self,
        job_id: &JobId,
        token: &CancellationToken,
        result: Result<JobStatus>,
    ) -> PollControl {
        let mut state = self.state.lock().await;

        if token.is_cancelled() {
            tracing::debug!(job_id = %job_id, "Discarding status response from a stopped poller");
            return PollControl::Stop;
        }
        let started_at = match &state.phase {
            Phase::Processing {
                job_id: current,
                started_at,
                ..
            } if current == job_id => *started_at,
            _ => {
                tracing::debug!(job_id = %job_id, "Discarding status response for an unbound job");
                return PollControl::Stop;
            }
        };

        let result = result.and_then(|status| {
            if status.job_id == *job_id {
                Ok(status)
            } else {
                Err(Error::Other(format!(
                    "status response was for job {} instead of {}",
                    status.job_id, job_id
                )))
            }
        });

        match result {
            Ok(mut status) => {
                state.consecutive_poll_failures = 0;
                if state.error.take().is_some() {
                    self.emit_event(Event::ErrorCleared);
                }

                tracing::debug!(
                    job_id = %job_id,
                    status = %status.status,
                    progress = status.progress,
                    current_step = %status.current_step,
                    "Job status updated"
                );
                self.emit_event(Event::StatusUpdated {
                    job_id: job_id.clone(),
                    status: status.status,
                    progress: status.progress,
                    current_step: status.current_step.clone(),
                });

                if status.is_terminal() {
                    self.finish(&mut state, status);
                    return PollControl::Stop;
                }

                // A result is only meaningful once the job has ended
                if status.result.take().is_some() {
                    tracing::debug!(job_id = %job_id, "Ignoring result on a non-terminal status");
                }
                if let Phase::Processing { status: latest, .. } = &mut state.phase {
                    *latest = Some(status);
                }
            }
            Err(e) => {
                state.consecutive_poll_failures += 1;
                let failures = state.consecutive_poll_failures;
                let message = format!("status check failed: {e}");

                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    consecutive_failures = failures,
                    max_failures = self.config.polling.max_consecutive_failures,
                    "Status poll failed"
                );
                self.emit_event(Event::PollFailed {
                    job_id: job_id.clone(),
                    error: e.to_string(),
                    consecutive_failures: failures,
                });
                self.emit_event(Event::ErrorRaised {
                    code: e.error_code().to_string(),
                    message: message.clone(),
                });
                state.error = Some(message);

                if failures >= self.config.polling.max_consecutive_failures {
                    let reason = format!("{failures} consecutive status checks failed");
                    self.abandon(&mut state, job_id, reason);
                    return PollControl::Stop;
                }
            }
        }

        if let Some(max_duration) = self.config.polling.max_duration {
            if started_at.elapsed() >= max_duration {
                let reason = format!("no terminal status after {max_duration:?}");
                self.abandon(&mut state, job_id, reason);
                return PollControl::Stop;
            }
        }

        PollControl::Continue
    }

    /// Move to the done step with a terminal status
    fn finish(&self, state: &mut WorkflowState, status: JobStatus) {
        let (upload, configuration, job_id) = match &state.phase {
            Phase::Processing {
                upload,
                configuration,
                job_id,
                ..
            } => (upload.clone(), configuration.clone(), job_id.clone()),
            _ => return,
        };

        state.is_processing = false;
        state.poll = None;

        let outcome = Outcome::from_status(&status);
        match &outcome {
            Some(Outcome::Success { invoice_count, .. }) => {
                tracing::info!(job_id = %job_id, invoice_count, "Job completed");
            }
            Some(Outcome::CompletedWithErrors {
                invoice_count,
                error_count,
                ..
            }) => {
                tracing::warn!(
                    job_id = %job_id,
                    invoice_count,
                    error_count,
                    "Job completed with file errors"
                );
            }
            Some(Outcome::Failed { message, .. }) => {
                tracing::warn!(job_id = %job_id, message = %message, "Job failed");
            }
            None => {}
        }

        self.transition(
            state,
            Phase::Done {
                upload,
                configuration,
                job_id: job_id.clone(),
                status,
            },
        );
        if let Some(outcome) = outcome {
            self.emit_event(Event::Finished { job_id, outcome });
        }
    }

    /// Stop polling without a terminal status; the step stays processing
    fn abandon(&self, state: &mut WorkflowState, job_id: &JobId, reason: String) {
        tracing::error!(job_id = %job_id, reason = %reason, "Giving up on job status");

        state.is_processing = false;
        if let Some(poll) = state.poll.take() {
            poll.token.cancel();
        }

        self.emit_event(Event::PollingStopped {
            job_id: job_id.clone(),
            reason: reason.clone(),
        });
        self.record_error(
            state,
            Error::PollingAbandoned {
                job_id: job_id.to_string(),
                reason,
            },
        );
    }
}
