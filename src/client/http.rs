//! reqwest implementation of the processing API collaborators.

use super::{
    JobSubmitter, ProgressCallback, ResultRetriever, SavedArtifact, StatusPoller, UploadClient,
};
use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result, ValidationError};
use crate::retry::with_retry;
use crate::types::{ExportConfiguration, JobHandle, JobId, JobStatus, UploadDescriptor};
use crate::validation::LocalFile;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Size of the chunks file bodies are streamed in (progress granularity)
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Longest error body quoted in an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Serialize)]
struct SubmitRequest<'a> {
    upload_id: &'a str,
    configuration: &'a ExportConfiguration,
}

/// HTTP client for the upload, submit, status and download endpoints
///
/// Endpoints are resolved against `api.base_url`:
/// - `POST upload` (multipart, one `files` part per file)
/// - `POST process` (JSON `{upload_id, configuration}`)
/// - `GET status/{job_id}`
/// - `GET {output_path}` (absolute URL, or relative to the base URL)
#[derive(Clone, Debug)]
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: Url,
    upload_timeout: Duration,
    max_file_size: u64,
    retry: RetryConfig,
}

impl HttpApiClient {
    /// Build a client from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.api.request_timeout)
            .build()?;

        // A trailing slash makes Url::join append instead of replacing the last segment
        let base = format!("{}/", config.api.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base).map_err(|e| Error::Config {
            message: format!("base URL '{}' is invalid: {}", config.api.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;

        Ok(Self {
            client,
            base_url,
            upload_timeout: config.api.upload_timeout,
            max_file_size: config.limits.max_file_size,
            retry: config.retry.clone(),
        })
    }

    /// Base URL all endpoints are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn status_url(&self, job_id: &JobId) -> Result<Url> {
        let mut url = self.endpoint("status")?;
        url.path_segments_mut()
            .map_err(|_| Error::Config {
                message: format!("base URL '{}' cannot carry a path", self.base_url),
                key: Some("api.base_url".to_string()),
            })?
            .push(job_id.as_str());
        Ok(url)
    }

    fn artifact_url(&self, output_path: &str) -> Result<Url> {
        match Url::parse(output_path) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => self.endpoint(output_path),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_to_file(&self, url: &Url, path: &Path) -> Result<u64> {
        let response = self.client.get(url.clone()).send().await?;
        let mut response = check_status(response).await?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl UploadClient for HttpApiClient {
    async fn upload(
        &self,
        files: &[LocalFile],
        on_progress: ProgressCallback,
    ) -> Result<UploadDescriptor> {
        let url = self.endpoint("upload")?;

        // Everything is read before the request starts so a file that no
        // longer matches its selection fails without sending anything.
        let mut contents = Vec::with_capacity(files.len());
        for file in files {
            let data = tokio::fs::read(&file.path)
                .await
                .map_err(|e| Error::FileUnreadable {
                    path: file.path.clone(),
                    reason: e.to_string(),
                })?;
            check_read_size(file, data.len() as u64, self.max_file_size)?;
            contents.push(data);
        }

        let total: u64 = contents.iter().map(|data| data.len() as u64).sum();
        let sent = Arc::new(AtomicU64::new(0));

        let mut form = Form::new();
        for (file, data) in files.iter().zip(contents) {
            let length = data.len() as u64;
            let body = progress_body(data, sent.clone(), total, on_progress.clone());
            let part = Part::stream_with_length(body, length)
                .file_name(file.name.clone())
                .mime_str(mime_for(&file.name))?;
            form = form.part("files", part);
        }

        tracing::debug!(url = %url, files = files.len(), bytes = total, "Uploading files");

        let response = self
            .client
            .post(url)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await?;
        let descriptor: UploadDescriptor = decode(response).await?;

        on_progress(total, total);
        Ok(descriptor)
    }
}

#[async_trait]
impl JobSubmitter for HttpApiClient {
    async fn submit(
        &self,
        upload_id: &str,
        configuration: &ExportConfiguration,
    ) -> Result<JobHandle> {
        let url = self.endpoint("process")?;
        tracing::debug!(url = %url, upload_id, "Submitting job");

        let response = self
            .client
            .post(url)
            .json(&SubmitRequest {
                upload_id,
                configuration,
            })
            .send()
            .await?;
        decode(response).await
    }
}

#[async_trait]
impl StatusPoller for HttpApiClient {
    async fn poll(&self, job_id: &JobId) -> Result<JobStatus> {
        let url = self.status_url(job_id)?;
        let response = self.client.get(url).send().await?;
        decode(response).await
    }
}

#[async_trait]
impl ResultRetriever for HttpApiClient {
    async fn retrieve(
        &self,
        output_path: &str,
        destination_dir: &Path,
    ) -> Result<SavedArtifact> {
        let url = self.artifact_url(output_path)?;
        tokio::fs::create_dir_all(destination_dir).await?;

        let file_name = artifact_file_name(&url);
        let final_path = destination_dir.join(&file_name);
        let part_path = destination_dir.join(format!(".{file_name}.part"));

        let fetched = with_retry(&self.retry, || self.fetch_to_file(&url, &part_path)).await;
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&part_path).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %part_path.display(), error = %cleanup, "Failed to remove partial download");
                    }
                }
                return Err(e);
            }
        };

        tokio::fs::rename(&part_path, &final_path).await?;
        tracing::info!(url = %url, path = %final_path.display(), bytes, "Result downloaded");

        Ok(SavedArtifact {
            path: final_path,
            bytes,
        })
    }
}

/// Compare the bytes read for `file` against its selection and the size limit
fn check_read_size(file: &LocalFile, actual: u64, max_file_size: u64) -> Result<()> {
    if actual > max_file_size {
        tracing::warn!(file = %file.name, size = actual, max = max_file_size, "File grew past the size limit");
        return Err(ValidationError::FileTooLarge {
            name: file.name.clone(),
            size: actual,
            max: max_file_size,
        }
        .into());
    }
    if actual != file.size {
        return Err(ValidationError::FileChanged {
            name: file.name.clone(),
            expected: file.size,
            actual,
        }
        .into());
    }
    Ok(())
}

/// Stream `data` in chunks, reporting cumulative bytes through `on_progress`
fn progress_body(
    data: Vec<u8>,
    sent: Arc<AtomicU64>,
    total: u64,
    on_progress: ProgressCallback,
) -> reqwest::Body {
    let chunks: Vec<Vec<u8>> = data.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        let len = chunk.len() as u64;
        let done = sent.fetch_add(len, Ordering::Relaxed) + len;
        on_progress(done.min(total), total);
        Ok::<_, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

fn mime_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".json") {
        "application/json"
    } else if lower.ends_with(".pdf") {
        "application/pdf"
    } else {
        "application/octet-stream"
    }
}

fn artifact_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "result".to_string())
}

/// Turn a non-2xx response into `Error::Http`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_from(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = error_message_from_body(&body)
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "request failed".to_string());

    Err(Error::Http {
        status: status.as_u16(),
        message,
        retry_after,
    })
}

/// Delay requested by a `Retry-After` header
///
/// Only the delta-seconds form is understood; an HTTP date is ignored.
fn retry_after_from(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Pull a human-readable message out of an error body
///
/// Understands `{"detail": ".."}`, `{"message": ".."}` and `{"error": ".."}`,
/// falling back to the (truncated) raw text.
fn error_message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["detail", "message", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return Some(text.to_string());
            }
        }
    }

    Some(trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect())
}
