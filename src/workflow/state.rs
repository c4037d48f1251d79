//! Workflow state and the read-only projection handed to observers.

use crate::types::{
    DownloadRecord, ExportConfiguration, JobId, JobStatus, Outcome, Step, UploadDescriptor,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Data owned by the current step
///
/// Each variant carries exactly what its step needs, so a processing workflow
/// always has a job id and a configure workflow always has an upload.
#[derive(Debug)]
pub(crate) enum Phase {
    Upload,
    Configure {
        upload: UploadDescriptor,
        configuration: ExportConfiguration,
    },
    Processing {
        upload: UploadDescriptor,
        configuration: ExportConfiguration,
        job_id: JobId,
        status: Option<JobStatus>,
        /// When the current polling run started
        started_at: Instant,
    },
    Done {
        upload: UploadDescriptor,
        configuration: ExportConfiguration,
        job_id: JobId,
        status: JobStatus,
    },
}

impl Phase {
    pub(crate) fn step(&self) -> Step {
        match self {
            Phase::Upload => Step::Upload,
            Phase::Configure { .. } => Step::Configure,
            Phase::Processing { .. } => Step::Processing,
            Phase::Done { .. } => Step::Done,
        }
    }

    pub(crate) fn upload(&self) -> Option<&UploadDescriptor> {
        match self {
            Phase::Upload => None,
            Phase::Configure { upload, .. }
            | Phase::Processing { upload, .. }
            | Phase::Done { upload, .. } => Some(upload),
        }
    }

    pub(crate) fn configuration(&self) -> Option<&ExportConfiguration> {
        match self {
            Phase::Upload => None,
            Phase::Configure { configuration, .. }
            | Phase::Processing { configuration, .. }
            | Phase::Done { configuration, .. } => Some(configuration),
        }
    }

    pub(crate) fn job_id(&self) -> Option<&JobId> {
        match self {
            Phase::Upload | Phase::Configure { .. } => None,
            Phase::Processing { job_id, .. } | Phase::Done { job_id, .. } => Some(job_id),
        }
    }

    pub(crate) fn status(&self) -> Option<&JobStatus> {
        match self {
            Phase::Upload | Phase::Configure { .. } => None,
            Phase::Processing { status, .. } => status.as_ref(),
            Phase::Done { status, .. } => Some(status),
        }
    }
}

/// The polling loop currently bound to the workflow
#[derive(Debug)]
pub(crate) struct ActivePoll {
    pub(crate) job_id: JobId,
    /// Child of the run token; cancelled on reset, retry or shutdown
    pub(crate) token: CancellationToken,
    pub(crate) handle: JoinHandle<()>,
}

/// Mutable workflow state, guarded by the orchestrator's mutex
#[derive(Debug)]
pub(crate) struct WorkflowState {
    pub(crate) phase: Phase,
    /// Identifies the current run. Reset cancels it and installs a fresh one,
    /// so responses captured under the old token are recognized as stale.
    pub(crate) run: CancellationToken,
    pub(crate) is_uploading: bool,
    pub(crate) is_processing: bool,
    pub(crate) is_downloading: bool,
    pub(crate) consecutive_poll_failures: u32,
    pub(crate) error: Option<String>,
    pub(crate) last_download: Option<DownloadRecord>,
    pub(crate) poll: Option<ActivePoll>,
}

impl WorkflowState {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Upload,
            run: CancellationToken::new(),
            is_uploading: false,
            is_processing: false,
            is_downloading: false,
            consecutive_poll_failures: 0,
            error: None,
            last_download: None,
            poll: None,
        }
    }

    /// Whether a polling loop is bound to the workflow
    pub(crate) fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|p| !p.token.is_cancelled())
    }

    /// Build the observer-facing projection
    pub(crate) fn snapshot(&self, upload_progress: u8) -> WorkflowSnapshot {
        let step = self.phase.step();
        let status = self.phase.status().cloned();

        let progress = match step {
            Step::Upload | Step::Configure => 0,
            Step::Processing => status.as_ref().map(|s| s.progress).unwrap_or(0),
            Step::Done => 100,
        };

        let current_step = status
            .as_ref()
            .map(|s| s.current_step.clone())
            .filter(|s| !s.is_empty());

        let outcome = match &self.phase {
            Phase::Done { status, .. } => Outcome::from_status(status),
            _ => None,
        };

        WorkflowSnapshot {
            step,
            upload: self.phase.upload().cloned(),
            configuration: self.phase.configuration().cloned(),
            job_id: self.phase.job_id().cloned(),
            status,
            is_uploading: self.is_uploading,
            is_processing: self.is_processing,
            is_downloading: self.is_downloading,
            is_polling: self.is_polling(),
            upload_progress: if self.is_uploading || step != Step::Upload {
                upload_progress
            } else {
                0
            },
            progress,
            current_step,
            consecutive_poll_failures: self.consecutive_poll_failures,
            error: self.error.clone(),
            outcome,
            last_download: self.last_download.clone(),
        }
    }
}

/// Point-in-time view of the workflow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// Current step
    pub step: Step,
    /// Upload descriptor, present from the configure step on
    pub upload: Option<UploadDescriptor>,
    /// Export configuration, present from the configure step on
    pub configuration: Option<ExportConfiguration>,
    /// Job identifier, present from the processing step on
    pub job_id: Option<JobId>,
    /// Latest job status accepted from the poller
    pub status: Option<JobStatus>,
    /// An upload request is in flight
    pub is_uploading: bool,
    /// A submission is in flight or the job is being polled
    pub is_processing: bool,
    /// A result download is in flight
    pub is_downloading: bool,
    /// A polling loop is active
    pub is_polling: bool,
    /// Upload progress percentage
    pub upload_progress: u8,
    /// Processing progress percentage (100 once done)
    pub progress: u8,
    /// Server step label, if one was reported
    pub current_step: Option<String>,
    /// Consecutive failed status queries
    pub consecutive_poll_failures: u32,
    /// Latest user-facing error
    pub error: Option<String>,
    /// How the finished job should be presented
    pub outcome: Option<Outcome>,
    /// Most recent successful result download
    pub last_download: Option<DownloadRecord>,
}

impl WorkflowSnapshot {
    /// A finished job produced an artifact that can be downloaded
    pub fn can_download(&self) -> bool {
        self.step == Step::Done
            && !self.is_downloading
            && self
                .status
                .as_ref()
                .and_then(|s| s.result.as_ref())
                .is_some_and(|r| !r.output_path.is_empty())
    }
}
