//! In-memory stand-in for the vendor platform, shared by the integration
//! tests. Implements all three adapter traits and records every call.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use layerflow::adapters::{AuthApi, BucketCreation, StorageApi, WorkItemApi};
use layerflow::core::{
    ArtifactStaging, ClientIdentity, CredentialProvider, JobOrchestrator, LayerPipeline,
    PipelineSettings, ResultRetrieval,
};
use layerflow::domain::{
    ArtifactRef, Credential, JobHandle, JobSpec, JobStatus, StatusReport, TransferMode,
    UploadTarget, Verb,
};
use layerflow::error::{PipelineError, Result};

pub const BUCKET: &str = "snapclean-test";
pub const REPORT_URL: &str = "https://reports.test/workitems/wi-1/report.txt";

/// How the bucket check behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketBehavior {
    Exists,
    Absent,
    /// Absent on check, then creation answers "already exists"
    Conflict,
}

/// What the work item reports once it stops being in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    Success,
    Failed { report_url: Option<String> },
    Never,
}

#[derive(Debug, Clone)]
pub struct FakeConfig {
    pub token_failure: Option<u16>,
    pub bucket: BucketBehavior,
    /// Polls answered with `inprogress` before the terminal status
    pub in_progress_polls: u32,
    pub terminal: Terminal,
    /// Read URL requests answered 404 after the job writes its output
    pub output_hidden_for: u32,
    /// What an extract job writes to its output
    pub layers: Vec<String>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            token_failure: None,
            bucket: BucketBehavior::Exists,
            in_progress_polls: 0,
            terminal: Terminal::Success,
            output_hidden_for: 0,
            layers: vec!["0".to_string(), "Walls".to_string(), "Doors".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
struct UploadSlot {
    bucket: String,
    key: String,
    upload_key: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<&'static str>,
    buckets: HashSet<String>,
    objects: HashMap<(String, String), Vec<u8>>,
    /// Write URL -> target object
    upload_urls: HashMap<String, UploadSlot>,
    /// Staged bytes waiting for completion, by upload key
    staged: HashMap<String, Vec<u8>>,
    /// Read URL -> object
    download_urls: HashMap<String, (String, String)>,
    hidden: HashMap<String, u32>,
    completion_sizes: Vec<u64>,
    submitted: Vec<JobSpec>,
    poll_instants: Vec<Instant>,
    download_attempts: HashMap<String, u32>,
    next_id: u32,
}

pub struct FakeVendor {
    config: FakeConfig,
    state: Mutex<State>,
}

impl FakeVendor {
    pub fn new(config: FakeConfig) -> Arc<Self> {
        let mut state = State::default();
        if config.bucket == BucketBehavior::Exists {
            state.buckets.insert(BUCKET.to_string());
        }
        Arc::new(Self {
            config,
            state: Mutex::new(state),
        })
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn completion_sizes(&self) -> Vec<u64> {
        self.state.lock().unwrap().completion_sizes.clone()
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn poll_instants(&self) -> Vec<Instant> {
        self.state.lock().unwrap().poll_instants.clone()
    }

    /// Read URL requests made for `key`
    pub fn download_attempts(&self, key: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .download_attempts
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(BUCKET.to_string(), key.to_string()))
            .cloned()
    }

    /// First stored object whose key starts with `prefix`
    pub fn object_with_prefix(&self, prefix: &str) -> Option<(String, Vec<u8>)> {
        self.state
            .lock()
            .unwrap()
            .objects
            .iter()
            .find(|((_, key), _)| key.starts_with(prefix))
            .map(|((_, key), bytes)| (key.clone(), bytes.clone()))
    }

    /// Put an object directly, bypassing the upload handshake
    pub fn insert_object(&self, key: &str, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert((BUCKET.to_string(), key.to_string()), bytes.to_vec());
    }

    /// Hide `key` from the next `attempts` read URL requests
    pub fn hide(&self, key: &str, attempts: u32) {
        self.state
            .lock()
            .unwrap()
            .hidden
            .insert(key.to_string(), attempts);
    }

    fn record(&self, call: &'static str) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Play the remote job: write every `put` argument
    fn run_job(&self, state: &mut State, spec: &JobSpec) {
        let input = spec
            .arguments
            .values()
            .filter(|arg| arg.verb == Verb::Get)
            .filter_map(|arg| state.download_urls.get(&arg.url).cloned())
            .filter_map(|loc| state.objects.get(&loc).cloned())
            .next()
            .unwrap_or_default();

        for (role, arg) in &spec.arguments {
            if arg.verb != Verb::Put {
                continue;
            }
            let Some(slot) = state.upload_urls.get(&arg.url).cloned() else {
                continue;
            };
            let bytes = if role == "outputLayers" {
                serde_json::to_vec(&self.config.layers).unwrap()
            } else {
                input.clone()
            };
            state.objects.insert((slot.bucket, slot.key.clone()), bytes);
            state.hidden.insert(slot.key, self.config.output_hidden_for);
        }
    }
}

/// Shorthand for a job that reports in-progress `n` times, then `terminal`
pub fn job(n: u32, terminal: Terminal) -> FakeConfig {
    FakeConfig {
        in_progress_polls: n,
        terminal,
        ..FakeConfig::default()
    }
}

pub fn credential() -> Credential {
    Credential::new("test-token")
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        bucket: BUCKET.to_string(),
        scopes: vec!["data:read".to_string(), "code:all".to_string()],
        extract_activity: "snapclean.ExtractLayersActivity+prod".to_string(),
        rename_activity: "snapclean.RenameLayersActivity+prod".to_string(),
        deadline: Duration::from_secs(180),
    }
}

pub fn staging(fake: &Arc<FakeVendor>, mode: TransferMode) -> Arc<ArtifactStaging> {
    Arc::new(ArtifactStaging::new(fake.clone(), mode, "transient"))
}

/// Pipeline wired to `fake` with the default polling schedules
pub fn pipeline(fake: &Arc<FakeVendor>, mode: TransferMode) -> LayerPipeline {
    pipeline_with(fake, mode, settings())
}

pub fn pipeline_with(fake: &Arc<FakeVendor>, mode: TransferMode, settings: PipelineSettings) -> LayerPipeline {
    let staging = staging(fake, mode);
    LayerPipeline::new(
        CredentialProvider::new(
            fake.clone(),
            ClientIdentity {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
            },
        ),
        staging.clone(),
        JobOrchestrator::new(fake.clone()),
        ResultRetrieval::new(staging),
        settings,
    )
}

#[async_trait]
impl AuthApi for FakeVendor {
    async fn request_token(
        &self,
        _client_id: &str,
        _client_secret: &str,
        _scopes: &[String],
    ) -> Result<Credential> {
        self.record("request_token");
        if let Some(status) = self.config.token_failure {
            return Err(PipelineError::Auth {
                message: format!("HTTP {}", status),
                details: Some(json!({
                    "developerMessage": "The client_id specified does not have access to the api product",
                    "errorCode": "AUTH-001"
                })),
            });
        }
        Ok(credential())
    }
}

#[async_trait]
impl StorageApi for FakeVendor {
    async fn bucket_exists(&self, _credential: &Credential, bucket: &str) -> Result<bool> {
        self.record("bucket_exists");
        Ok(self.state.lock().unwrap().buckets.contains(bucket))
    }

    async fn create_bucket(
        &self,
        _credential: &Credential,
        bucket: &str,
        _policy: &str,
    ) -> Result<BucketCreation> {
        self.record("create_bucket");
        let mut state = self.state.lock().unwrap();
        state.buckets.insert(bucket.to_string());
        match self.config.bucket {
            BucketBehavior::Conflict => Ok(BucketCreation::AlreadyExists),
            _ => Ok(BucketCreation::Created),
        }
    }

    async fn issue_upload(
        &self,
        _credential: &Credential,
        bucket: &str,
        key: &str,
        mode: TransferMode,
    ) -> Result<UploadTarget> {
        self.record("issue_upload");
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let url = format!("https://store.test/put/{}/{}/{}", bucket, key, state.next_id);
        let upload_key = match mode {
            TransferMode::SingleShot => None,
            TransferMode::Staged => Some(format!("uk-{}", state.next_id)),
        };
        state.upload_urls.insert(
            url.clone(),
            UploadSlot {
                bucket: bucket.to_string(),
                key: key.to_string(),
                upload_key: upload_key.clone(),
            },
        );
        Ok(match upload_key {
            None => UploadTarget::SingleShot { url },
            Some(upload_key) => UploadTarget::Staged { url, upload_key },
        })
    }

    async fn put_object(&self, artifact: &ArtifactRef, payload: &[u8]) -> Result<()> {
        self.record("put_object");
        let mut state = self.state.lock().unwrap();
        let slot = state
            .upload_urls
            .get(artifact.url())
            .cloned()
            .ok_or_else(|| PipelineError::Upload {
                key: artifact.key.clone(),
                message: "HTTP 403 Forbidden".to_string(),
                details: None,
            })?;
        match slot.upload_key {
            // Staged bytes stay invisible until completion
            Some(upload_key) => {
                state.staged.insert(upload_key, payload.to_vec());
            }
            None => {
                state.objects.insert((slot.bucket, slot.key), payload.to_vec());
            }
        }
        Ok(())
    }

    async fn complete_upload(
        &self,
        _credential: &Credential,
        bucket: &str,
        key: &str,
        upload_key: &str,
        size: u64,
    ) -> Result<()> {
        self.record("complete_upload");
        let mut state = self.state.lock().unwrap();
        state.completion_sizes.push(size);
        let bytes = state.staged.remove(upload_key).ok_or_else(|| PipelineError::Upload {
            key: key.to_string(),
            message: "unknown upload key".to_string(),
            details: None,
        })?;
        if bytes.len() as u64 != size {
            return Err(PipelineError::Upload {
                key: key.to_string(),
                message: format!("size mismatch: declared {}, received {}", size, bytes.len()),
                details: None,
            });
        }
        state.objects.insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn issue_download(&self, _credential: &Credential, bucket: &str, key: &str) -> Result<String> {
        self.record("issue_download");
        let mut state = self.state.lock().unwrap();
        *state.download_attempts.entry(key.to_string()).or_default() += 1;

        let not_found = || PipelineError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
            details: Some(json!({ "reason": "Object not found" })),
        };

        if let Some(remaining) = state.hidden.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(not_found());
            }
        }

        let location = (bucket.to_string(), key.to_string());
        if !state.objects.contains_key(&location) {
            return Err(not_found());
        }

        state.next_id += 1;
        let url = format!("https://store.test/get/{}/{}/{}", bucket, key, state.next_id);
        state.download_urls.insert(url.clone(), location);
        Ok(url)
    }

    async fn get_object(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        self.record("get_object");
        let state = self.state.lock().unwrap();
        state
            .download_urls
            .get(artifact.url())
            .and_then(|location| state.objects.get(location))
            .cloned()
            .ok_or_else(|| PipelineError::NotFound {
                bucket: artifact.bucket.clone(),
                key: artifact.key.clone(),
                details: None,
            })
    }
}

#[async_trait]
impl WorkItemApi for FakeVendor {
    async fn submit(&self, _credential: &Credential, spec: &JobSpec) -> Result<JobHandle> {
        self.record("submit");
        let mut state = self.state.lock().unwrap();
        state.submitted.push(spec.clone());
        Ok(JobHandle::submitted(
            format!("wi-{}", state.submitted.len()),
            &spec.activity_id,
        ))
    }

    async fn status(&self, _credential: &Credential, _job_id: &str) -> Result<StatusReport> {
        self.record("status");
        let mut state = self.state.lock().unwrap();
        state.poll_instants.push(Instant::now());
        let polls = state.poll_instants.len() as u32;

        if polls <= self.config.in_progress_polls {
            return Ok(StatusReport {
                status: JobStatus::InProgress,
                report_url: None,
            });
        }

        match &self.config.terminal {
            Terminal::Success => {
                if let Some(spec) = state.submitted.last().cloned() {
                    self.run_job(&mut state, &spec);
                }
                Ok(StatusReport {
                    status: JobStatus::Success,
                    report_url: Some(REPORT_URL.to_string()),
                })
            }
            Terminal::Failed { report_url } => Ok(StatusReport {
                status: JobStatus::from_vendor("failedInstructions"),
                report_url: report_url.clone(),
            }),
            Terminal::Never => Ok(StatusReport {
                status: JobStatus::InProgress,
                report_url: None,
            }),
        }
    }

    async fn fetch_report(&self, _report_url: &str) -> Result<String> {
        self.record("fetch_report");
        Ok("[10/19/2026 10:00:00] Error: Could not open drawing\n[10/19/2026 10:00:01] Job failed".to_string())
    }
}
