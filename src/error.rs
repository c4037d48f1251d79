//! Error types for invoice-workflow
//!
//! This module provides the error handling for the library, including:
//! - The crate-wide [`Error`] enum and [`Result`] alias
//! - [`ValidationError`] for rejections that happen before any network call
//! - A machine-readable classification ([`ErrorCategory`], [`Error::error_code`])
//!   so observers can tell validation failures apart from transport failures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for invoice-workflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for invoice-workflow
///
/// Every failure the orchestrator can observe maps onto one of these variants.
/// The orchestrator records the rendered message in the workflow `error` field
/// and also returns the error to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// Input rejected before any network call was made
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Action not allowed in the current workflow step
    #[error("cannot {operation} while in the {step} step")]
    InvalidState {
        /// The action that was attempted (e.g., "start processing")
        operation: String,
        /// The step the workflow was in
        step: String,
    },

    /// Another action of the same kind is still running
    #[error("{0} already in progress")]
    Busy(String),

    /// The workflow was reset while this action's request was in flight
    #[error("{0} was superseded by a reset")]
    Superseded(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("server returned {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Message extracted from the response body (or the status reason)
        message: String,
        /// Delay the server asked for through `Retry-After`
        retry_after: Option<Duration>,
    },

    /// Invalid URL composed from the base URL and an endpoint path
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Selected file could not be read
    #[error("cannot read {path}: {reason}")]
    FileUnreadable {
        /// Path of the file
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Polling stopped before the job reached a terminal status
    #[error("stopped waiting for job {job_id}: {reason}")]
    PollingAbandoned {
        /// The job that was being polled
        job_id: String,
        /// Why polling stopped
        reason: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Client-side validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Nothing was selected
    #[error("no files selected")]
    EmptySelection,

    /// More files than the configured maximum
    #[error("too many files: {count} selected, at most {max} allowed")]
    TooManyFiles {
        /// Number of files selected
        count: usize,
        /// Configured maximum
        max: usize,
    },

    /// A single file exceeds the configured size limit
    #[error("{name} is too large: {size} bytes, limit is {max} bytes")]
    FileTooLarge {
        /// File name
        name: String,
        /// File size in bytes
        size: u64,
        /// Configured maximum in bytes
        max: u64,
    },

    /// A file's extension is not in the accepted set
    #[error("{name} has an unsupported file type (accepted: {accepted})")]
    UnsupportedFileType {
        /// File name
        name: String,
        /// Comma-separated list of accepted extensions
        accepted: String,
    },

    /// A file's size on disk no longer matches the size it was selected with
    #[error("{name} changed after it was selected: expected {expected} bytes, found {actual}")]
    FileChanged {
        /// File name
        name: String,
        /// Size recorded at selection
        expected: u64,
        /// Size read from disk
        actual: u64,
    },

    /// Export configuration has no column profile
    #[error("a column profile must be selected")]
    MissingColumnProfile,

    /// Export configuration has no output format
    #[error("an output format must be selected")]
    MissingOutputFormat,
}

/// Coarse classification of an [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input, rejected locally
    Validation,
    /// Network failure or non-2xx response
    Transport,
    /// Action invoked in the wrong step, or while busy
    State,
    /// Configuration, I/O, decoding and everything else
    Internal,
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            Error::FileUnreadable { .. } => ErrorCategory::Validation,

            Error::Network(_) => ErrorCategory::Transport,
            Error::Http { .. } => ErrorCategory::Transport,
            Error::PollingAbandoned { .. } => ErrorCategory::Transport,

            Error::InvalidState { .. } => ErrorCategory::State,
            Error::Busy(_) => ErrorCategory::State,
            Error::Superseded(_) => ErrorCategory::State,

            Error::Config { .. } => ErrorCategory::Internal,
            Error::Url(_) => ErrorCategory::Internal,
            Error::Serialization(_) => ErrorCategory::Internal,
            Error::Io(_) => ErrorCategory::Internal,
            Error::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(e) => match e {
                ValidationError::EmptySelection => "empty_selection",
                ValidationError::TooManyFiles { .. } => "too_many_files",
                ValidationError::FileTooLarge { .. } => "file_too_large",
                ValidationError::UnsupportedFileType { .. } => "unsupported_file_type",
                ValidationError::FileChanged { .. } => "file_changed",
                ValidationError::MissingColumnProfile => "missing_column_profile",
                ValidationError::MissingOutputFormat => "missing_output_format",
            },
            Error::InvalidState { .. } => "invalid_state",
            Error::Busy(_) => "busy",
            Error::Superseded(_) => "superseded",
            Error::Network(_) => "network_error",
            Error::Http { .. } => "http_error",
            Error::Url(_) => "invalid_url",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::FileUnreadable { .. } => "file_unreadable",
            Error::PollingAbandoned { .. } => "polling_abandoned",
            Error::Other(_) => "internal_error",
        }
    }
}
