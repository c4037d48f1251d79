//! Client-side checks run before any request is sent
//!
//! A selection that fails here never reaches the upload endpoint, and an
//! export configuration that fails here is never submitted.

use crate::config::{UploadLimits, normalize_extension};
use crate::error::{Error, Result, ValidationError};
use crate::types::ExportConfiguration;
use std::path::{Path, PathBuf};

/// A file selected for upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalFile {
    /// Location on disk
    pub path: PathBuf,
    /// File name sent to the server
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

impl LocalFile {
    /// Describe a file without touching the filesystem
    ///
    /// `size` is what the selection is validated against. The HTTP upload
    /// client rejects the file if the bytes it reads differ from it.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        Self { path, name, size }
    }

    /// Stat a file on disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::FileUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !metadata.is_file() {
            return Err(Error::FileUnreadable {
                path: path.to_path_buf(),
                reason: "not a regular file".to_string(),
            });
        }

        Ok(Self::new(path, metadata.len()))
    }

    /// Lowercased extension with leading dot, if any
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension)
    }
}

/// Check a selection against count, type and size limits
///
/// Checks run in that order and stop at the first violation.
pub fn validate_selection(
    files: &[LocalFile],
    limits: &UploadLimits,
) -> std::result::Result<(), ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::EmptySelection);
    }

    if files.len() > limits.max_files {
        return Err(ValidationError::TooManyFiles {
            count: files.len(),
            max: limits.max_files,
        });
    }

    let accepted: Vec<String> = limits
        .accepted_file_types
        .iter()
        .map(|t| normalize_extension(t))
        .collect();

    for file in files {
        let type_ok = file
            .extension()
            .is_some_and(|ext| accepted.iter().any(|a| *a == ext));
        if !type_ok {
            return Err(ValidationError::UnsupportedFileType {
                name: file.name.clone(),
                accepted: accepted.join(", "),
            });
        }

        if file.size > limits.max_file_size {
            return Err(ValidationError::FileTooLarge {
                name: file.name.clone(),
                size: file.size,
                max: limits.max_file_size,
            });
        }
    }

    Ok(())
}

/// Check that an export configuration can be submitted
pub fn validate_configuration(
    configuration: &ExportConfiguration,
) -> std::result::Result<(), ValidationError> {
    if configuration.column_profile.trim().is_empty() {
        return Err(ValidationError::MissingColumnProfile);
    }
    if configuration.output_format.is_none() {
        return Err(ValidationError::MissingOutputFormat);
    }
    Ok(())
}
