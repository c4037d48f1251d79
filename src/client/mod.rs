//! External collaborators of the workflow orchestrator
//!
//! Each remote capability sits behind its own trait so the orchestrator can be
//! driven by fakes in tests:
//!
//! - [`UploadClient`] - sends local files, returns an upload descriptor
//! - [`JobSubmitter`] - creates a processing job for an upload
//! - [`StatusPoller`] - queries a job's status once
//! - [`ResultRetriever`] - saves the produced artifact
//!
//! [`HttpApiClient`] implements all four against the processing API.

mod http;

pub use http::HttpApiClient;

use crate::config::Config;
use crate::error::Result;
use crate::types::{ExportConfiguration, JobHandle, JobId, JobStatus, UploadDescriptor};
use crate::validation::LocalFile;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Upload progress callback, called with (bytes sent, total bytes)
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Sends a batch of local files to the upload endpoint
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// Upload `files` in order
    ///
    /// Implementations that can observe the transfer report it through
    /// `on_progress`; others may call it once at the end or not at all.
    async fn upload(
        &self,
        files: &[LocalFile],
        on_progress: ProgressCallback,
    ) -> Result<UploadDescriptor>;
}

/// Requests processing of an uploaded batch
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Create a job for `upload_id` with the given export configuration
    async fn submit(
        &self,
        upload_id: &str,
        configuration: &ExportConfiguration,
    ) -> Result<JobHandle>;
}

/// Queries the status of a job
#[async_trait]
pub trait StatusPoller: Send + Sync {
    /// Issue one status query
    async fn poll(&self, job_id: &JobId) -> Result<JobStatus>;
}

/// A result artifact written to disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedArtifact {
    /// Where the artifact was saved
    pub path: PathBuf,
    /// Bytes written
    pub bytes: u64,
}

/// Downloads the artifact produced by a finished job
#[async_trait]
pub trait ResultRetriever: Send + Sync {
    /// Save the artifact at `output_path` into `destination_dir`
    async fn retrieve(&self, output_path: &str, destination_dir: &Path)
    -> Result<SavedArtifact>;
}

/// The set of collaborators an orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    /// Upload endpoint
    pub uploader: Arc<dyn UploadClient>,
    /// Job submission endpoint
    pub submitter: Arc<dyn JobSubmitter>,
    /// Status polling endpoint
    pub poller: Arc<dyn StatusPoller>,
    /// Result download
    pub retriever: Arc<dyn ResultRetriever>,
}

impl Collaborators {
    /// Use one HTTP client for all four collaborators
    pub fn http(config: &Config) -> Result<Self> {
        let client = Arc::new(HttpApiClient::new(config)?);
        Ok(Self {
            uploader: client.clone(),
            submitter: client.clone(),
            poller: client.clone(),
            retriever: client,
        })
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
