//! # invoice-workflow
//!
//! Client-side orchestration for a batch invoice processing service.
//!
//! A batch moves through four steps:
//! 1. **Upload** - local JSON exports and PDF scans are validated and sent
//! 2. **Configure** - the user picks a column profile and an output format
//! 3. **Processing** - a job is submitted and its status polled until it ends
//! 4. **Done** - the outcome is presented and the artifact can be downloaded
//!
//! `reset` returns to an empty upload step from anywhere, including while a
//! job is being polled.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events or read snapshots
//! - **Injectable** - Each remote capability is a trait; the HTTP client is
//!   one implementation
//!
//! ## Quick Start
//!
//! ```no_run
//! use invoice_workflow::{Config, LocalFile, WorkflowOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let workflow = WorkflowOrchestrator::with_http(config)?;
//!
//!     let mut events = workflow.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let files = vec![
//!         LocalFile::from_path("invoices/acme.json").await?,
//!         LocalFile::from_path("invoices/globex.pdf").await?,
//!     ];
//!     workflow.start_upload(files).await?;
//!     workflow.start_processing().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Upload, submission, polling and download collaborators
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types shared between the client and the workflow
pub mod types;
/// Client-side validation of selections and export configurations
pub mod validation;
/// Workflow orchestrator (decomposed into focused submodules)
pub mod workflow;

// Re-export commonly used types
pub use client::{
    Collaborators, HttpApiClient, JobSubmitter, ProgressCallback, ResultRetriever, SavedArtifact,
    StatusPoller, UploadClient,
};
pub use config::{ApiConfig, Config, PollingConfig, RetryConfig, UploadLimits};
pub use error::{Error, ErrorCategory, Result, ValidationError};
pub use types::{
    DownloadRecord, Event, ExportConfiguration, FileError, JobHandle, JobId, JobResult, JobState,
    JobStatus, OutputFormat, Outcome, Step, UploadDescriptor, UploadedFile,
};
pub use validation::LocalFile;
pub use workflow::{WorkflowOrchestrator, WorkflowSnapshot};
