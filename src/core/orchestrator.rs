//! Job orchestrator: submit a work item and poll it to a terminal state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::poll::{poll_until, PollOutcome, PollPolicy};
use crate::adapters::WorkItemApi;
use crate::domain::{Credential, JobHandle, JobSpec, JobStatus};
use crate::error::{PipelineError, Result};

/// Drives work items through the remote queue
pub struct JobOrchestrator {
    work_items: Arc<dyn WorkItemApi>,
    policy: PollPolicy,
}

impl JobOrchestrator {
    pub fn new(work_items: Arc<dyn WorkItemApi>) -> Self {
        Self {
            work_items,
            policy: PollPolicy::job_default(),
        }
    }

    /// Override the status polling schedule
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Submit a work item; the returned handle is `Pending`
    #[instrument(skip(self, credential, spec), fields(activity = %spec.activity_id))]
    pub async fn submit(&self, credential: &Credential, spec: &JobSpec) -> Result<JobHandle> {
        if spec.arguments.is_empty() {
            return Err(PipelineError::Submission {
                message: "work item has no arguments".to_string(),
                details: None,
            });
        }

        let handle = self.work_items.submit(credential, spec).await?;
        info!(job_id = %handle.id, "Submitted work item");
        Ok(handle)
    }

    /// Poll until the work item reaches a terminal state.
    ///
    /// `Success` returns the updated handle. A reported failure becomes
    /// `JobFailed` carrying the report URL; running out of attempts becomes
    /// `JobTimeout`, since the job may still finish server-side.
    #[instrument(skip(self, credential, handle, cancel), fields(job_id = %handle.id))]
    pub async fn await_completion(
        &self,
        credential: &Credential,
        mut handle: JobHandle,
        cancel: &CancellationToken,
    ) -> Result<JobHandle> {
        if handle.is_terminal() {
            return Self::finish(handle);
        }

        let work_items = &self.work_items;
        let job_id = handle.id.clone();

        let outcome = poll_until(
            &self.policy,
            cancel,
            |attempt| {
                let job_id = job_id.clone();
                async move {
                    let report = work_items.status(credential, &job_id).await?;
                    info!(attempt, status = %report.status, "Polled work item");
                    Ok::<_, PipelineError>(report)
                }
            },
            |report| report.status.is_terminal(),
        )
        .await?;

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                handle.apply(value);
                handle.polls = attempts;
                Self::finish(handle)
            }
            PollOutcome::Exhausted { last, attempts } => {
                let last_status = last.map(|r| r.status).unwrap_or(JobStatus::Pending);
                warn!(attempts, status = %last_status, "Gave up waiting for work item");
                Err(PipelineError::JobTimeout {
                    job_id: handle.id,
                    attempts,
                    last_status,
                })
            }
            PollOutcome::Cancelled { attempts } => Err(PipelineError::Cancelled(format!(
                "stopped waiting for work item {} after {} polls",
                handle.id, attempts
            ))),
        }
    }

    /// Download the human-readable report of a finished work item
    pub async fn fetch_report(&self, report_url: &str) -> Result<String> {
        self.work_items.fetch_report(report_url).await
    }

    fn finish(handle: JobHandle) -> Result<JobHandle> {
        match &handle.status {
            JobStatus::Success => {
                info!(job_id = %handle.id, "Work item succeeded");
                Ok(handle)
            }
            JobStatus::Failed { reason } => {
                error!(job_id = %handle.id, %reason, report_url = ?handle.report_url, "Work item failed");
                Err(PipelineError::JobFailed {
                    job_id: handle.id.clone(),
                    status: reason.clone(),
                    report_url: handle.report_url.clone(),
                    details: handle
                        .report_url
                        .as_ref()
                        .map(|url| serde_json::json!({ "reportUrl": url })),
                })
            }
            _ => Err(PipelineError::JobTimeout {
                job_id: handle.id.clone(),
                attempts: handle.polls,
                last_status: handle.status.clone(),
            }),
        }
    }
}
