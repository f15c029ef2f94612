//! End-to-end layer pipelines.
//!
//! Composes the protocol stages into the two flows the service offers:
//! - extract: upload a drawing, run the extract activity, return layer names
//! - rename: upload a drawing plus a mapping CSV, run the rename activity,
//!   return a read URL for the renamed drawing

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::credentials::CredentialProvider;
use super::orchestrator::JobOrchestrator;
use super::retrieval::ResultRetrieval;
use super::staging::ArtifactStaging;
use crate::domain::{mapping, Credential, JobHandle, JobSpec, LayerMapping, TransferMode};
use crate::error::{PipelineError, Result};

/// Argument role names declared by the remote activities
pub mod roles {
    pub const INPUT_FILE: &str = "inputFile";
    pub const OUTPUT_LAYERS: &str = "outputLayers";
    pub const MAPPING_FILE: &str = "mappingFile";
    pub const OUTPUT_FILE: &str = "outputFile";
}

/// How much of a failure report is attached to the error
const REPORT_TAIL_BYTES: usize = 4096;

/// Static settings for a pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub bucket: String,
    pub scopes: Vec<String>,
    /// Fully qualified extract activity id
    pub extract_activity: String,
    /// Fully qualified rename activity id
    pub rename_activity: String,
    /// Deadline for one run, polling included
    pub deadline: Duration,
}

/// Outcome of a layer extraction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerReport {
    pub object_key: String,
    pub output_key: String,
    pub work_item_id: String,
    pub layers: Vec<String>,
}

/// Outcome of a rename run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameReport {
    pub object_key: String,
    pub output_key: String,
    pub work_item_id: String,
    /// Time-limited read URL for the renamed drawing
    pub download_url: String,
}

/// Runs extract/rename flows against the remote platform
pub struct LayerPipeline {
    credentials: CredentialProvider,
    staging: Arc<ArtifactStaging>,
    orchestrator: JobOrchestrator,
    retrieval: ResultRetrieval,
    settings: PipelineSettings,
}

impl LayerPipeline {
    pub fn new(
        credentials: CredentialProvider,
        staging: Arc<ArtifactStaging>,
        orchestrator: JobOrchestrator,
        retrieval: ResultRetrieval,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            credentials,
            staging,
            orchestrator,
            retrieval,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Extract the layer names of a drawing
    #[instrument(skip(self, payload, cancel), fields(run_id = %Uuid::new_v4(), bytes = payload.len()))]
    pub async fn extract_layers(
        &self,
        object_key: &str,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<LayerReport> {
        validate_object_key(object_key)?;
        if payload.is_empty() {
            return Err(PipelineError::InvalidRequest(format!(
                "'{}' is empty",
                object_key
            )));
        }

        let cancel = &cancel.child_token();
        self.with_deadline(cancel, async {
            let bucket = self.settings.bucket.as_str();
            let credential = self.prepare(bucket).await?;

            let input = self.stage_input(&credential, bucket, object_key, &payload).await?;

            let output_key = format!("layers-{}.json", Utc::now().timestamp_millis());
            let output = self
                .staging
                .begin_upload_with(&credential, bucket, &output_key, TransferMode::SingleShot)
                .await?;

            let spec = JobSpec::new(&self.settings.extract_activity)
                .with_input(roles::INPUT_FILE, &input)?
                .with_output(roles::OUTPUT_LAYERS, &output)?;

            let handle = self.run_job(&credential, &spec, cancel).await?;

            let result = self
                .retrieval
                .fetch_result(&credential, bucket, &output_key, cancel)
                .await?;
            let layers: Vec<String> = result.decode()?;

            info!(layers = layers.len(), job_id = %handle.id, "Extracted layers");
            Ok::<_, PipelineError>(LayerReport {
                object_key: object_key.to_string(),
                output_key,
                work_item_id: handle.id,
                layers,
            })
        })
        .await
    }

    /// Rename layers of a drawing according to `mappings`
    #[instrument(skip(self, payload, mappings, cancel), fields(run_id = %Uuid::new_v4(), mappings = mappings.len()))]
    pub async fn rename_layers(
        &self,
        object_key: &str,
        payload: Vec<u8>,
        mappings: &[LayerMapping],
        cancel: &CancellationToken,
    ) -> Result<RenameReport> {
        validate_object_key(object_key)?;
        mapping::validate(mappings)?;
        if payload.is_empty() {
            return Err(PipelineError::InvalidRequest(format!(
                "'{}' is empty",
                object_key
            )));
        }

        let cancel = &cancel.child_token();
        self.with_deadline(cancel, async {
            let bucket = self.settings.bucket.as_str();
            let credential = self.prepare(bucket).await?;
            let stamp = Utc::now().timestamp_millis();

            let input = self.stage_input(&credential, bucket, object_key, &payload).await?;

            let mapping_key = format!("mapping-{}.csv", stamp);
            let csv = mapping::to_csv(mappings);
            let mapping_file = self
                .stage_input(&credential, bucket, &mapping_key, csv.as_bytes())
                .await?;

            let output_key = format!("renamed-{}-{}", stamp, object_key);
            let output = self
                .staging
                .begin_upload_with(&credential, bucket, &output_key, TransferMode::SingleShot)
                .await?;

            let spec = JobSpec::new(&self.settings.rename_activity)
                .with_input(roles::INPUT_FILE, &input)?
                .with_input(roles::MAPPING_FILE, &mapping_file)?
                .with_output(roles::OUTPUT_FILE, &output)?;

            let handle = self.run_job(&credential, &spec, cancel).await?;

            let renamed = self
                .retrieval
                .await_visible(&credential, bucket, &output_key, cancel)
                .await?;

            info!(job_id = %handle.id, %output_key, "Renamed layers");
            Ok::<_, PipelineError>(RenameReport {
                object_key: object_key.to_string(),
                output_key,
                work_item_id: handle.id,
                download_url: renamed.url().to_string(),
            })
        })
        .await
    }

    /// Token plus bucket, shared by both flows
    async fn prepare(&self, bucket: &str) -> Result<Credential> {
        let credential = self.credentials.obtain_credential(&self.settings.scopes).await?;
        self.staging.ensure_bucket(&credential, bucket).await?;
        Ok(credential)
    }

    /// Upload bytes and return a read reference the remote job can GET
    async fn stage_input(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<crate::domain::ArtifactRef> {
        let upload = self.staging.begin_upload(credential, bucket, key).await?;
        self.staging.upload_bytes(credential, &upload, payload).await?;
        self.staging.begin_download(credential, bucket, key).await
    }

    /// Submit and wait. Failure reports are attached on a best-effort basis.
    async fn run_job(
        &self,
        credential: &Credential,
        spec: &JobSpec,
        cancel: &CancellationToken,
    ) -> Result<JobHandle> {
        let handle = self.orchestrator.submit(credential, spec).await?;

        match self.orchestrator.await_completion(credential, handle, cancel).await {
            Err(PipelineError::JobFailed {
                job_id,
                status,
                report_url: Some(report_url),
                details,
            }) => {
                let details = match self.orchestrator.fetch_report(&report_url).await {
                    Ok(report) => Some(serde_json::json!({
                        "reportUrl": report_url,
                        "reportTail": tail(&report, REPORT_TAIL_BYTES),
                    })),
                    Err(e) => {
                        warn!(error = %e, "Could not fetch work item report");
                        details
                    }
                };
                Err(PipelineError::JobFailed {
                    job_id,
                    status,
                    report_url: Some(report_url),
                    details,
                })
            }
            other => other,
        }
    }

    /// Run `fut` until it finishes, `cancel` fires, or the deadline passes.
    /// Passing the deadline cancels `cancel` so pending polls stop too.
    async fn with_deadline<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = self.settings.deadline;
        tokio::select! {
            result = fut => result,
            _ = cancel.cancelled() => Err(PipelineError::Cancelled("cancelled by caller".to_string())),
            _ = tokio::time::sleep(deadline) => {
                cancel.cancel();
                warn!(deadline_secs = deadline.as_secs(), "Pipeline deadline exceeded");
                Err(PipelineError::Cancelled(format!(
                    "deadline of {}s exceeded",
                    deadline.as_secs()
                )))
            }
        }
    }
}

/// Object keys become path segments on both sides; keep them flat
pub fn validate_object_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(PipelineError::InvalidRequest("Missing objectKey".to_string()));
    }
    if key.contains(['/', '\\']) || key == "." || key == ".." {
        return Err(PipelineError::InvalidRequest(format!(
            "objectKey '{}' must be a plain file name",
            key
        )));
    }
    Ok(())
}

/// Last `max` bytes of `text`, on a char boundary
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
