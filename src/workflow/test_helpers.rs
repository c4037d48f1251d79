//! Scriptable collaborators for driving the orchestrator in tests.

use crate::client::{
    Collaborators, JobSubmitter, ProgressCallback, ResultRetriever, SavedArtifact, StatusPoller,
    UploadClient,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{
    ExportConfiguration, FileError, JobHandle, JobId, JobResult, JobState, JobStatus, Step,
    UploadDescriptor, UploadedFile,
};
use crate::validation::LocalFile;
use crate::workflow::WorkflowOrchestrator;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) const JOB_ID: &str = "job-42";
pub(crate) const UPLOAD_ID: &str = "up-7";

/// A failure the fakes can be told to produce
pub(crate) fn server_error(message: &str) -> Error {
    Error::Http {
        status: 503,
        message: message.to_string(),
        retry_after: None,
    }
}

/// Lets a test hold a fake's request open until it decides to release it
#[derive(Default)]
pub(crate) struct Gate {
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
pub(crate) struct FakeUploader {
    pub(crate) calls: AtomicUsize,
    pub(crate) fail_with: Mutex<Option<String>>,
    pub(crate) gate: Mutex<Option<Arc<Gate>>>,
}

#[async_trait]
impl UploadClient for FakeUploader {
    async fn upload(
        &self,
        files: &[LocalFile],
        on_progress: ProgressCallback,
    ) -> Result<UploadDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(server_error(&message));
        }

        let total: u64 = files.iter().map(|f| f.size).sum();
        on_progress(total / 2, total);
        on_progress(total, total);

        Ok(descriptor_for(files))
    }
}

/// Descriptor the server would return for `files`
pub(crate) fn descriptor_for(files: &[LocalFile]) -> UploadDescriptor {
    let kind = |f: &LocalFile| {
        if f.extension().as_deref() == Some(".pdf") {
            "pdf"
        } else {
            "json"
        }
    };
    UploadDescriptor {
        upload_id: UPLOAD_ID.to_string(),
        file_count: files.len() as u32,
        json_count: files.iter().filter(|f| kind(f) == "json").count() as u32,
        pdf_count: files.iter().filter(|f| kind(f) == "pdf").count() as u32,
        files: files
            .iter()
            .map(|f| UploadedFile {
                filename: f.name.clone(),
                file_type: kind(f).to_string(),
                path: format!("/staging/{UPLOAD_ID}/{}", f.name),
            })
            .collect(),
    }
}

#[derive(Default)]
pub(crate) struct FakeSubmitter {
    pub(crate) calls: AtomicUsize,
    pub(crate) submitted: Mutex<Vec<(String, ExportConfiguration)>>,
    pub(crate) fail_with: Mutex<Option<String>>,
    pub(crate) gate: Mutex<Option<Arc<Gate>>>,
}

#[async_trait]
impl JobSubmitter for FakeSubmitter {
    async fn submit(
        &self,
        upload_id: &str,
        configuration: &ExportConfiguration,
    ) -> Result<JobHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(server_error(&message));
        }
        self.submitted
            .lock()
            .unwrap()
            .push((upload_id.to_string(), configuration.clone()));
        Ok(JobHandle {
            job_id: JobId::new(JOB_ID),
        })
    }
}

/// One scripted poll response
#[derive(Clone, Debug)]
pub(crate) enum PollStep {
    Status(JobStatus),
    Fail(String),
}

/// Replays a script of responses; the last one repeats once the script runs out
#[derive(Default)]
pub(crate) struct ScriptedPoller {
    pub(crate) calls: AtomicUsize,
    pub(crate) script: Mutex<VecDeque<PollStep>>,
    pub(crate) last: Mutex<Option<PollStep>>,
    pub(crate) gate: Mutex<Option<Arc<Gate>>>,
}

impl ScriptedPoller {
    pub(crate) fn push(&self, step: PollStep) {
        self.script.lock().unwrap().push_back(step);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusPoller for ScriptedPoller {
    async fn poll(&self, _job_id: &JobId) -> Result<JobStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let next = self.script.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = next {
                *last = Some(next);
            }
            last.clone()
        };

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        match step {
            Some(PollStep::Status(status)) => Ok(status),
            Some(PollStep::Fail(message)) => Err(server_error(&message)),
            None => Ok(status(JobState::Queued, 0, "Queued")),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeRetriever {
    pub(crate) requested: Mutex<Vec<String>>,
    pub(crate) fail_with: Mutex<Option<String>>,
}

#[async_trait]
impl ResultRetriever for FakeRetriever {
    async fn retrieve(&self, output_path: &str, destination_dir: &Path) -> Result<SavedArtifact> {
        self.requested.lock().unwrap().push(output_path.to_string());
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(server_error(&message));
        }
        let name = output_path.rsplit('/').next().unwrap_or("result");
        Ok(SavedArtifact {
            path: destination_dir.join(name),
            bytes: 2048,
        })
    }
}

/// An orchestrator wired to fakes, with handles to inspect them
pub(crate) struct Harness {
    pub(crate) orchestrator: WorkflowOrchestrator,
    pub(crate) uploader: Arc<FakeUploader>,
    pub(crate) submitter: Arc<FakeSubmitter>,
    pub(crate) poller: Arc<ScriptedPoller>,
    pub(crate) retriever: Arc<FakeRetriever>,
}

/// Config with a fast polling interval
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.polling.interval = Duration::from_millis(10);
    config.polling.max_consecutive_failures = 3;
    config.polling.max_duration = Some(Duration::from_secs(30));
    config.download_dir = std::env::temp_dir().join("invoice-workflow-tests");
    config
}

pub(crate) fn harness() -> Harness {
    harness_with(test_config())
}

pub(crate) fn harness_with(config: Config) -> Harness {
    let uploader = Arc::new(FakeUploader::default());
    let submitter = Arc::new(FakeSubmitter::default());
    let poller = Arc::new(ScriptedPoller::default());
    let retriever = Arc::new(FakeRetriever::default());

    let collaborators = Collaborators {
        uploader: uploader.clone(),
        submitter: submitter.clone(),
        poller: poller.clone(),
        retriever: retriever.clone(),
    };
    let orchestrator = WorkflowOrchestrator::new(config, collaborators).unwrap();

    Harness {
        orchestrator,
        uploader,
        submitter,
        poller,
        retriever,
    }
}

/// Two JSON exports and one PDF scan
pub(crate) fn sample_files() -> Vec<LocalFile> {
    vec![
        LocalFile::new("/in/acme-2024-01.json", 1_200),
        LocalFile::new("/in/acme-2024-02.json", 1_450),
        LocalFile::new("/in/globex-scan.pdf", 48_000),
    ]
}

pub(crate) fn status(state: JobState, progress: u8, current_step: &str) -> JobStatus {
    JobStatus {
        job_id: JobId::new(JOB_ID),
        status: state,
        progress,
        current_step: current_step.to_string(),
        result: None,
    }
}

pub(crate) fn completed(invoice_count: u32, errors: Vec<FileError>) -> JobStatus {
    JobStatus {
        job_id: JobId::new(JOB_ID),
        status: JobState::Completed,
        progress: 100,
        current_step: "Done".to_string(),
        result: Some(JobResult {
            invoice_count,
            error_count: errors.len() as u32,
            errors,
            output_path: format!("/exports/{JOB_ID}.xlsx"),
        }),
    }
}

impl Harness {
    /// Upload the sample files and land in the configure step
    pub(crate) async fn to_configure(&self) {
        self.orchestrator.start_upload(sample_files()).await.unwrap();
        assert_eq!(self.orchestrator.step().await, Step::Configure);
    }

    /// Upload and submit, landing in the processing step
    pub(crate) async fn to_processing(&self) {
        self.to_configure().await;
        self.orchestrator.start_processing().await.unwrap();
    }

    /// Wait until `predicate` holds for the snapshot, or panic after a second
    pub(crate) async fn wait_until<F>(&self, what: &str, predicate: F)
    where
        F: Fn(&crate::workflow::WorkflowSnapshot) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let snapshot = self.orchestrator.snapshot().await;
            if predicate(&snapshot) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {what}; last snapshot: {snapshot:?}");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub(crate) async fn wait_for_step(&self, step: Step) {
        self.wait_until(&format!("step {step}"), |s| s.step == step)
            .await;
    }
}
