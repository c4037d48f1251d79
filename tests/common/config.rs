//! Test configuration helpers for wiring an orchestrator to a mock API server

use invoice_workflow::{Config, WorkflowOrchestrator};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// Base path the mock API is mounted under
pub const API_PREFIX: &str = "/api";

/// Config pointing at `server`, polling fast, downloading into `download_dir`
pub fn config_for(server: &MockServer, download_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("{}{}", server.uri(), API_PREFIX);
    config.api.request_timeout = Duration::from_secs(5);
    config.polling.interval = Duration::from_millis(20);
    config.polling.max_consecutive_failures = 3;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config.download_dir = download_dir.path().join("downloads");
    config
}

/// HTTP-backed orchestrator talking to `server`
///
/// Returns the orchestrator and the tempdir holding its download directory
/// (which must be kept alive).
pub fn create_http_workflow(server: &MockServer) -> (WorkflowOrchestrator, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = config_for(server, &temp_dir);
    let workflow = WorkflowOrchestrator::with_http(config).expect("Failed to build orchestrator");
    (workflow, temp_dir)
}
