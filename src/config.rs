//! Configuration types for invoice-workflow

use crate::error::{Error, Result};
use crate::types::ExportConfiguration;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Prefix of the environment variables read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "INVOICE_WORKFLOW_";

/// Processing API connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the processing API (default: "http://localhost:8000/api")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for submit, poll and download requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for the upload request, which carries the file payload (default: 300 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub upload_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            upload_timeout: default_upload_timeout(),
        }
    }
}

/// Client-side constraints checked before anything is uploaded
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadLimits {
    /// Maximum size of a single file in bytes (default: 50 MiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum number of files per upload (default: 50)
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Accepted file extensions, with leading dot (default: [".json", ".pdf"])
    #[serde(default = "default_accepted_file_types")]
    pub accepted_file_types: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
            accepted_file_types: default_accepted_file_types(),
        }
    }
}

/// Status polling cadence and bounds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between polls (default: 2000 ms)
    #[serde(default = "default_polling_interval", with = "duration_millis_serde")]
    pub interval: Duration,

    /// Stop polling after this many consecutive transport failures (default: 10)
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Stop polling once a job has been processing this long (default: 30 minutes, None = never)
    #[serde(
        default = "default_max_processing_duration",
        with = "optional_duration_serde"
    )]
    pub max_duration: Option<Duration>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_polling_interval(),
            max_consecutive_failures: default_max_consecutive_failures(),
            max_duration: default_max_processing_duration(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the workflow orchestrator
///
/// Fields are organized into sub-configs:
/// - [`api`](ApiConfig) - base URL and request timeouts
/// - [`limits`](UploadLimits) - file count, size and type constraints
/// - [`polling`](PollingConfig) - poll interval and bounds
/// - [`retry`](RetryConfig) - backoff for result downloads
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Processing API connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Upload constraints
    #[serde(default)]
    pub limits: UploadLimits,

    /// Status polling settings
    #[serde(default)]
    pub polling: PollingConfig,

    /// Retry settings for result downloads
    #[serde(default)]
    pub retry: RetryConfig,

    /// Directory result artifacts are saved into (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Export configuration offered after a successful upload
    #[serde(default)]
    pub default_export: ExportConfiguration,
}

impl Config {
    /// Build a configuration from defaults overlaid with `INVOICE_WORKFLOW_*` variables
    ///
    /// Recognized variables: `API_URL`, `REQUEST_TIMEOUT_SECS`, `UPLOAD_TIMEOUT_SECS`,
    /// `MAX_FILE_SIZE`, `MAX_FILES`, `ACCEPTED_FILE_TYPES` (comma-separated),
    /// `POLLING_INTERVAL_MS`, `MAX_POLL_FAILURES`, `MAX_PROCESSING_SECS`
    /// (0 disables the cutoff) and `DOWNLOAD_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Same as [`Config::from_env`], reading variables (without prefix) through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(url) = lookup("API_URL") {
            config.api.base_url = url;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REQUEST_TIMEOUT_SECS")? {
            config.api.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "UPLOAD_TIMEOUT_SECS")? {
            config.api.upload_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var(&lookup, "MAX_FILE_SIZE")? {
            config.limits.max_file_size = size;
        }
        if let Some(count) = parse_var(&lookup, "MAX_FILES")? {
            config.limits.max_files = count;
        }
        if let Some(types) = lookup("ACCEPTED_FILE_TYPES") {
            config.limits.accepted_file_types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(normalize_extension)
                .collect();
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "POLLING_INTERVAL_MS")? {
            config.polling.interval = Duration::from_millis(ms);
        }
        if let Some(failures) = parse_var(&lookup, "MAX_POLL_FAILURES")? {
            config.polling.max_consecutive_failures = failures;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "MAX_PROCESSING_SECS")? {
            config.polling.max_duration = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(dir) = lookup("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(config_error("base URL must not be empty", "api.base_url"));
        }
        url::Url::parse(&self.api.base_url).map_err(|e| {
            config_error(
                format!("base URL '{}' is invalid: {}", self.api.base_url, e),
                "api.base_url",
            )
        })?;
        if self.api.request_timeout.is_zero() {
            return Err(config_error(
                "request timeout must be greater than zero",
                "api.request_timeout",
            ));
        }
        if self.limits.max_files == 0 {
            return Err(config_error(
                "at least one file must be allowed",
                "limits.max_files",
            ));
        }
        if self.limits.max_file_size == 0 {
            return Err(config_error(
                "maximum file size must be greater than zero",
                "limits.max_file_size",
            ));
        }
        if self.limits.accepted_file_types.is_empty() {
            return Err(config_error(
                "at least one accepted file type is required",
                "limits.accepted_file_types",
            ));
        }
        if self.polling.interval.is_zero() {
            return Err(config_error(
                "polling interval must be greater than zero",
                "polling.interval",
            ));
        }
        if self.polling.max_consecutive_failures == 0 {
            return Err(config_error(
                "at least one poll failure must be tolerated",
                "polling.max_consecutive_failures",
            ));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| Error::Config {
            message: format!("{ENV_PREFIX}{key}='{raw}' is invalid: {e}"),
            key: Some(key.to_string()),
        }),
        None => Ok(None),
    }
}

/// Lowercase an extension and make sure it starts with a dot
pub(crate) fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_max_files() -> usize {
    50
}

fn default_accepted_file_types() -> Vec<String> {
    vec![".json".to_string(), ".pdf".to_string()]
}

fn default_polling_interval() -> Duration {
    Duration::from_millis(2000)
}

fn default_max_consecutive_failures() -> u32 {
    10
}

fn default_max_processing_duration() -> Option<Duration> {
    Some(Duration::from_secs(30 * 60))
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

// Optional Duration serialization helper (whole seconds)
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
