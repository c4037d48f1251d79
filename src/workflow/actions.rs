//! User-triggered transitions.
//!
//! Every action checks the current step first. A rejected action leaves the
//! step untouched, records its error in the workflow and returns it.

use crate::error::{Error, Result};
use crate::types::{DownloadRecord, Event, ExportConfiguration, JobId, Step, UploadDescriptor};
use crate::validation::{LocalFile, validate_configuration, validate_selection};
use chrono::Utc;
use std::sync::atomic::Ordering;
use tokio::time::Instant;

use super::WorkflowOrchestrator;
use super::state::{Phase, WorkflowState};

fn invalid_state(operation: &str, step: Step) -> Error {
    Error::InvalidState {
        operation: operation.to_string(),
        step: step.to_string(),
    }
}

impl WorkflowOrchestrator {
    /// Validate and upload a selection of files
    ///
    /// On success the workflow moves to the configure step with the returned
    /// descriptor and the default export configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] outside the upload step
    /// - [`Error::Busy`] while another upload is in flight
    /// - [`Error::Validation`] if the selection breaks a limit; nothing is sent
    /// - any transport error from the upload client
    /// - [`Error::Superseded`] if the workflow was reset mid-upload
    pub async fn start_upload(&self, files: Vec<LocalFile>) -> Result<UploadDescriptor> {
        let run = {
            let mut state = self.state.lock().await;
            let step = state.phase.step();
            if step != Step::Upload {
                return Err(self.record_error(&mut state, invalid_state("upload files", step)));
            }
            if state.is_uploading {
                return Err(self.record_error(&mut state, Error::Busy("upload".into())));
            }
            if let Err(e) = validate_selection(&files, &self.config.limits) {
                tracing::debug!(error = %e, "Rejected file selection");
                return Err(self.record_error(&mut state, e.into()));
            }

            state.is_uploading = true;
            state.error = None;
            self.upload_progress.store(0, Ordering::SeqCst);
            state.run.clone()
        };

        let total_bytes: u64 = files.iter().map(|f| f.size).sum();
        tracing::info!(file_count = files.len(), total_bytes, "Uploading files");

        let on_progress = self.upload_progress_callback(run.clone());
        let result = self
            .collaborators
            .uploader
            .upload(&files, on_progress)
            .await;

        let mut state = self.state.lock().await;
        if run.is_cancelled() {
            tracing::debug!("Discarding upload response after reset");
            return Err(Error::Superseded("upload".into()));
        }
        state.is_uploading = false;

        match result {
            Ok(descriptor) => {
                tracing::info!(
                    upload_id = %descriptor.upload_id,
                    file_count = descriptor.file_count,
                    json_count = descriptor.json_count,
                    pdf_count = descriptor.pdf_count,
                    "Upload accepted"
                );
                self.upload_progress.store(100, Ordering::SeqCst);
                state.error = None;
                self.emit_event(Event::Uploaded {
                    upload_id: descriptor.upload_id.clone(),
                    file_count: descriptor.file_count,
                });
                self.transition(
                    &mut state,
                    Phase::Configure {
                        upload: descriptor.clone(),
                        configuration: self.config.default_export.clone(),
                    },
                );
                Ok(descriptor)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upload failed");
                Err(self.record_error(&mut state, e))
            }
        }
    }

    /// Replace the export configuration
    ///
    /// Allowed only in the configure step and not while a submission is in
    /// flight. The configuration is checked for completeness when processing
    /// starts, not here.
    pub async fn update_configuration(&self, configuration: ExportConfiguration) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_processing {
            return Err(self.record_error(&mut state, Error::Busy("job submission".into())));
        }
        match &mut state.phase {
            Phase::Configure {
                configuration: current,
                ..
            } => {
                *current = configuration.clone();
            }
            other => {
                let step = other.step();
                return Err(
                    self.record_error(&mut state, invalid_state("change the configuration", step))
                );
            }
        }

        tracing::debug!(
            column_profile = %configuration.column_profile,
            output_format = ?configuration.output_format,
            "Export configuration updated"
        );
        self.emit_event(Event::ConfigurationUpdated { configuration });
        Ok(())
    }

    /// Submit the uploaded batch for processing and start polling
    ///
    /// On success the workflow moves to the processing step and the polling
    /// loop is started. On failure the workflow stays in the configure step
    /// with its upload and configuration intact.
    pub async fn start_processing(&self) -> Result<JobId> {
        let (upload_id, configuration, run) = {
            let mut state = self.state.lock().await;
            let (upload_id, configuration) = match &state.phase {
                Phase::Configure {
                    upload,
                    configuration,
                } => (upload.upload_id.clone(), configuration.clone()),
                other => {
                    let step = other.step();
                    return Err(
                        self.record_error(&mut state, invalid_state("start processing", step))
                    );
                }
            };
            if state.is_processing {
                return Err(self.record_error(&mut state, Error::Busy("job submission".into())));
            }
            if let Err(e) = validate_configuration(&configuration) {
                return Err(self.record_error(&mut state, e.into()));
            }

            state.is_processing = true;
            state.error = None;
            (upload_id, configuration, state.run.clone())
        };

        tracing::info!(upload_id = %upload_id, "Submitting processing job");
        let result = self
            .collaborators
            .submitter
            .submit(&upload_id, &configuration)
            .await;

        let mut state = self.state.lock().await;
        if run.is_cancelled() {
            if let Ok(handle) = &result {
                tracing::warn!(
                    job_id = %handle.job_id,
                    "Job was created after the workflow was reset and will not be tracked"
                );
            }
            return Err(Error::Superseded("job submission".into()));
        }

        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, upload_id = %upload_id, "Job submission failed");
                state.is_processing = false;
                return Err(self.record_error(&mut state, e));
            }
        };

        let (upload, configuration) = match &state.phase {
            Phase::Configure {
                upload,
                configuration,
            } => (upload.clone(), configuration.clone()),
            _ => {
                state.is_processing = false;
                return Err(Error::Superseded("job submission".into()));
            }
        };

        let job_id = handle.job_id;
        tracing::info!(job_id = %job_id, upload_id = %upload_id, "Job submitted");

        state.consecutive_poll_failures = 0;
        self.emit_event(Event::JobSubmitted {
            job_id: job_id.clone(),
        });
        self.transition(
            &mut state,
            Phase::Processing {
                upload,
                configuration,
                job_id: job_id.clone(),
                status: None,
                started_at: Instant::now(),
            },
        );
        self.start_polling(&mut state, job_id.clone());

        Ok(job_id)
    }

    /// Restart polling after it stopped without a terminal status
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] outside the processing step
    /// - [`Error::Busy`] if a polling loop is still active
    pub async fn retry_polling(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_polling() {
            return Err(self.record_error(&mut state, Error::Busy("status polling".into())));
        }
        let job_id = match &mut state.phase {
            Phase::Processing {
                job_id, started_at, ..
            } => {
                *started_at = Instant::now();
                job_id.clone()
            }
            other => {
                let step = other.step();
                return Err(self.record_error(&mut state, invalid_state("resume polling", step)));
            }
        };

        tracing::info!(job_id = %job_id, "Resuming status polling");
        state.consecutive_poll_failures = 0;
        if state.error.take().is_some() {
            self.emit_event(Event::ErrorCleared);
        }
        self.start_polling(&mut state, job_id);
        Ok(())
    }

    /// Save the finished job's artifact into the download directory
    ///
    /// Requires the done step with a result. The workflow stays in the done
    /// step whatever happens.
    pub async fn download(&self) -> Result<DownloadRecord> {
        let (output_path, run) = {
            let mut state = self.state.lock().await;
            let step = state.phase.step();
            let output_path = match &state.phase {
                Phase::Done { status, .. } => status
                    .result
                    .as_ref()
                    .map(|r| r.output_path.clone())
                    .filter(|p| !p.is_empty()),
                _ => None,
            };
            let Some(output_path) = output_path else {
                return Err(self.record_error(&mut state, invalid_state("download the result", step)));
            };
            if state.is_downloading {
                return Err(self.record_error(&mut state, Error::Busy("download".into())));
            }

            state.is_downloading = true;
            (output_path, state.run.clone())
        };

        tracing::info!(output_path = %output_path, "Downloading result");
        let result = self
            .collaborators
            .retriever
            .retrieve(&output_path, &self.config.download_dir)
            .await;

        let mut state = self.state.lock().await;
        if run.is_cancelled() {
            return Err(Error::Superseded("download".into()));
        }
        state.is_downloading = false;

        match result {
            Ok(artifact) => {
                tracing::info!(
                    saved_to = %artifact.path.display(),
                    bytes = artifact.bytes,
                    "Result downloaded"
                );
                let record = DownloadRecord {
                    output_path,
                    saved_to: artifact.path,
                    bytes: artifact.bytes,
                    downloaded_at: Utc::now(),
                };
                state.last_download = Some(record.clone());
                self.emit_event(Event::DownloadCompleted {
                    saved_to: record.saved_to.clone(),
                    bytes: record.bytes,
                });
                Ok(record)
            }
            Err(e) => {
                tracing::warn!(error = %e, output_path = %output_path, "Result download failed");
                Err(self.record_error(&mut state, e))
            }
        }
    }

    /// Dismiss the current error; a no-op when there is none
    pub async fn clear_error(&self) {
        let mut state = self.state.lock().await;
        if state.error.take().is_some() {
            self.emit_event(Event::ErrorCleared);
        }
    }

    /// Return to an empty upload step from any step
    ///
    /// The polling loop is stopped and every in-flight request is marked
    /// stale before the state is cleared, so nothing issued before the reset
    /// can change the workflow afterwards.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let from = state.phase.step();

        state.run.cancel();
        if let Some(poll) = state.poll.take() {
            tracing::debug!(job_id = %poll.job_id, "Stopping status polling for reset");
        }

        *state = WorkflowState::new();
        self.upload_progress.store(0, Ordering::SeqCst);

        tracing::info!(%from, "Workflow reset");
        self.emit_event(Event::Reset);
        if from != Step::Upload {
            self.emit_event(Event::StepChanged {
                from,
                to: Step::Upload,
            });
        }
    }
}
