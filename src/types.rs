//! Core types and events for invoice-workflow
//!
//! Wire types use the snake_case field names of the processing API, so they
//! deserialize straight from the server's JSON responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Server-assigned identifier of a processing job
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One file staged by the upload endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Original file name
    pub filename: String,
    /// File type as classified by the server ("json", "pdf")
    #[serde(rename = "type")]
    pub file_type: String,
    /// Server-side staging path
    pub path: String,
}

/// Metadata returned after a successful upload
///
/// Identifies the staged batch on the server. Never stored partially: the
/// orchestrator either holds a complete descriptor or none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDescriptor {
    /// Identifier of the staged batch
    pub upload_id: String,
    /// Total number of files accepted
    pub file_count: u32,
    /// Number of JSON invoices
    pub json_count: u32,
    /// Number of PDF invoices
    pub pdf_count: u32,
    /// Per-file metadata
    #[serde(default)]
    pub files: Vec<UploadedFile>,
}

/// Output format of the exported artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated values
    Csv,
    /// Excel workbook
    Xlsx,
    /// JSON document
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Csv => f.write_str("csv"),
            OutputFormat::Xlsx => f.write_str("xlsx"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// User-chosen options controlling the shape of the output artifact
///
/// Editable only while the workflow is in the configure step, frozen once the
/// job is submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfiguration {
    /// Name of the column profile to export
    #[serde(default = "default_column_profile")]
    pub column_profile: String,

    /// Selected output format (None until the user picks one)
    #[serde(default)]
    pub output_format: Option<OutputFormat>,

    /// Include a summary sheet/section
    #[serde(default = "default_true")]
    pub include_summary: bool,

    /// Include per-line detail
    #[serde(default = "default_true")]
    pub include_detail: bool,
}

impl Default for ExportConfiguration {
    fn default() -> Self {
        Self {
            column_profile: default_column_profile(),
            output_format: Some(OutputFormat::Xlsx),
            include_summary: true,
            include_detail: true,
        }
    }
}

fn default_column_profile() -> String {
    "standard".to_string()
}

fn default_true() -> bool {
    true
}

/// Handle returned by the job submission endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Identifier of the created job
    pub job_id: JobId,
}

/// Server-side job state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for a worker
    Queued,
    /// Being processed
    Processing,
    /// Finished (possibly with per-file errors)
    Completed,
    /// Finished unsuccessfully
    Failed,
}

impl JobState {
    /// Whether polling stops at this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Queued => f.write_str("queued"),
            JobState::Processing => f.write_str("processing"),
            JobState::Completed => f.write_str("completed"),
            JobState::Failed => f.write_str("failed"),
        }
    }
}

/// A file the server could not process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    /// File name
    pub file: String,
    /// Reason given by the server
    pub reason: String,
}

/// Result of a finished job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Number of invoices extracted
    pub invoice_count: u32,
    /// Number of files that failed
    pub error_count: u32,
    /// Per-file failures
    #[serde(default)]
    pub errors: Vec<FileError>,
    /// Location of the produced artifact
    pub output_path: String,
}

/// Snapshot of a job returned by each poll
///
/// Statuses are last-write-wins: each one replaces the previous.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Job identifier
    pub job_id: JobId,
    /// Job state
    pub status: JobState,
    /// Progress percentage, clamped to 0..=100
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    /// Free-form label of the current server step
    #[serde(default)]
    pub current_step: String,
    /// Present once the job has completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl JobStatus {
    /// Whether polling stops at this status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Clamp a raw progress value into 0..=100
pub fn clamp_progress(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

// Servers send progress as an integer or a float, occasionally out of range
fn deserialize_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.map(clamp_progress).unwrap_or(0))
}

/// Workflow step
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Selecting and uploading files
    Upload,
    /// Editing the export configuration
    Configure,
    /// Waiting for the server job
    Processing,
    /// Job reached a terminal status
    Done,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Upload => f.write_str("upload"),
            Step::Configure => f.write_str("configure"),
            Step::Processing => f.write_str("processing"),
            Step::Done => f.write_str("done"),
        }
    }
}

/// How a finished job should be presented
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Completed without per-file errors
    Success {
        /// Number of invoices extracted
        invoice_count: u32,
        /// Location of the produced artifact
        output_path: String,
    },
    /// Completed, but some files failed
    CompletedWithErrors {
        /// Number of invoices extracted
        invoice_count: u32,
        /// Number of files that failed
        error_count: u32,
        /// Each failed file and why
        errors: Vec<FileError>,
        /// Location of the produced artifact
        output_path: String,
    },
    /// The job itself failed
    Failed {
        /// Per-file failures reported with the failure, if any
        errors: Vec<FileError>,
        /// Last step label reported by the server
        message: String,
    },
}

impl Outcome {
    /// Derive the outcome from a terminal status
    ///
    /// Returns `None` for non-terminal statuses.
    pub fn from_status(status: &JobStatus) -> Option<Self> {
        match (status.status, &status.result) {
            (JobState::Completed, Some(result)) if result.error_count == 0 => {
                Some(Outcome::Success {
                    invoice_count: result.invoice_count,
                    output_path: result.output_path.clone(),
                })
            }
            (JobState::Completed, Some(result)) => Some(Outcome::CompletedWithErrors {
                invoice_count: result.invoice_count,
                error_count: result.error_count,
                errors: result.errors.clone(),
                output_path: result.output_path.clone(),
            }),
            (JobState::Completed, None) => Some(Outcome::Failed {
                errors: Vec::new(),
                message: "job completed without a result".to_string(),
            }),
            (JobState::Failed, result) => Some(Outcome::Failed {
                errors: result
                    .as_ref()
                    .map(|r| r.errors.clone())
                    .unwrap_or_default(),
                message: if status.current_step.is_empty() {
                    "processing failed".to_string()
                } else {
                    status.current_step.clone()
                },
            }),
            (JobState::Queued | JobState::Processing, _) => None,
        }
    }

    /// Whether the outcome is a clean success
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Record of a completed result download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Server-side location that was downloaded
    pub output_path: String,
    /// Where the artifact was saved
    pub saved_to: PathBuf,
    /// Bytes written
    pub bytes: u64,
    /// When the download finished
    pub downloaded_at: DateTime<Utc>,
}

/// Event emitted during the workflow
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The workflow moved to another step
    StepChanged {
        /// Previous step
        from: Step,
        /// New step
        to: Step,
    },

    /// Upload progress update
    UploadProgress {
        /// Percentage (0 to 100)
        percent: u8,
    },

    /// Upload accepted by the server
    Uploaded {
        /// Identifier of the staged batch
        upload_id: String,
        /// Number of files accepted
        file_count: u32,
    },

    /// Export configuration changed
    ConfigurationUpdated {
        /// The new configuration
        configuration: ExportConfiguration,
    },

    /// Job created
    JobSubmitted {
        /// Job identifier
        job_id: JobId,
    },

    /// Poll returned a status
    StatusUpdated {
        /// Job identifier
        job_id: JobId,
        /// Job state
        status: JobState,
        /// Progress percentage
        progress: u8,
        /// Current server step
        current_step: String,
    },

    /// Poll failed with a transient error
    PollFailed {
        /// Job identifier
        job_id: JobId,
        /// Error message
        error: String,
        /// Consecutive failures so far
        consecutive_failures: u32,
    },

    /// Polling stopped without a terminal status
    PollingStopped {
        /// Job identifier
        job_id: JobId,
        /// Why polling stopped
        reason: String,
    },

    /// Job reached a terminal status
    Finished {
        /// Job identifier
        job_id: JobId,
        /// How to present the result
        outcome: Outcome,
    },

    /// Result artifact saved
    DownloadCompleted {
        /// Where the artifact was saved
        saved_to: PathBuf,
        /// Bytes written
        bytes: u64,
    },

    /// An error was recorded
    ErrorRaised {
        /// Machine-readable error code
        code: String,
        /// Error message
        message: String,
    },

    /// The error was dismissed
    ErrorCleared,

    /// Workflow returned to the upload step
    Reset,

    /// Orchestrator shut down
    Shutdown,
}
