//! Result retrieval with store-visibility retries.
//!
//! A work item can report success before its output object is readable from
//! the store. Retrieval waits a little, then retries `NotFound` a bounded
//! number of times before giving up.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::poll::{poll_until, PollOutcome, PollPolicy};
use super::staging::ArtifactStaging;
use crate::domain::{ArtifactRef, Credential, ResultArtifact};
use crate::error::{PipelineError, Result};

/// Fetches job outputs once they become visible
pub struct ResultRetrieval {
    staging: Arc<ArtifactStaging>,
    policy: PollPolicy,
}

impl ResultRetrieval {
    pub fn new(staging: Arc<ArtifactStaging>) -> Self {
        Self {
            staging,
            policy: PollPolicy::result_default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Download and decode the object at `bucket/key`
    #[instrument(skip(self, credential, cancel))]
    pub async fn fetch_result(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<ResultArtifact> {
        let staging = &self.staging;
        let raw = self
            .retry_until_visible(bucket, key, cancel, |_| async move {
                let artifact = staging.begin_download(credential, bucket, key).await?;
                staging.download_bytes(&artifact).await
            })
            .await?;

        info!(bytes = raw.len(), "Fetched result");
        ResultArtifact::from_bytes(raw)
    }

    /// Wait until a read URL can be issued for `bucket/key`, without
    /// downloading the object
    #[instrument(skip(self, credential, cancel))]
    pub async fn await_visible(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<ArtifactRef> {
        let staging = &self.staging;
        self.retry_until_visible(bucket, key, cancel, |_| async move {
            staging.begin_download(credential, bucket, key).await
        })
        .await
    }

    async fn retry_until_visible<T, F, Fut>(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
        mut attempt_fetch: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let outcome = poll_until(
            &self.policy,
            cancel,
            |attempt| {
                let fetch = attempt_fetch(attempt);
                async move {
                    match fetch.await {
                        Ok(value) => Ok(Some(value)),
                        Err(e) if e.is_not_found() => {
                            warn!(attempt, "Result not visible yet");
                            Ok(None)
                        }
                        Err(e) => Err(e),
                    }
                }
            },
            Option::is_some,
        )
        .await?;

        match outcome {
            PollOutcome::Ready {
                value: Some(value), ..
            } => Ok(value),
            PollOutcome::Ready { value: None, attempts } | PollOutcome::Exhausted { attempts, .. } => {
                Err(PipelineError::ResultNotAvailable {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    attempts,
                })
            }
            PollOutcome::Cancelled { attempts } => Err(PipelineError::Cancelled(format!(
                "stopped waiting for '{}' after {} attempts",
                key, attempts
            ))),
        }
    }
}
