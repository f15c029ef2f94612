//! Artifact staging: buckets, signed URLs and byte transfers.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::adapters::{BucketCreation, StorageApi};
use crate::domain::{ArtifactRef, Credential, Direction, TransferMode, UploadTarget};
use crate::error::{PipelineError, Result};

/// Result of ensuring a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    /// The details check found it
    Existing,
    Created,
    /// Creation raced with another creator; still usable
    AlreadyExists,
}

/// Moves payloads in and out of the store
pub struct ArtifactStaging {
    storage: Arc<dyn StorageApi>,
    /// Flavor used by `begin_upload`
    mode: TransferMode,
    /// Retention policy for buckets created on demand
    bucket_policy: String,
}

impl ArtifactStaging {
    pub fn new(storage: Arc<dyn StorageApi>, mode: TransferMode, bucket_policy: impl Into<String>) -> Self {
        Self {
            storage,
            mode,
            bucket_policy: bucket_policy.into(),
        }
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Check-then-create. "Already exists" is success.
    #[instrument(skip(self, credential))]
    pub async fn ensure_bucket(&self, credential: &Credential, bucket: &str) -> Result<BucketStatus> {
        if self.storage.bucket_exists(credential, bucket).await? {
            debug!("Bucket exists");
            return Ok(BucketStatus::Existing);
        }

        match self
            .storage
            .create_bucket(credential, bucket, &self.bucket_policy)
            .await?
        {
            BucketCreation::Created => {
                info!(policy = %self.bucket_policy, "Created bucket");
                Ok(BucketStatus::Created)
            }
            BucketCreation::AlreadyExists => {
                info!("Bucket already exists, continuing");
                Ok(BucketStatus::AlreadyExists)
            }
        }
    }

    /// Request a write URL in the configured flavor
    pub async fn begin_upload(&self, credential: &Credential, bucket: &str, key: &str) -> Result<ArtifactRef> {
        self.begin_upload_with(credential, bucket, key, self.mode).await
    }

    /// Request a write URL in an explicit flavor.
    ///
    /// The flavor is fixed for the object from here on.
    pub async fn begin_upload_with(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        mode: TransferMode,
    ) -> Result<ArtifactRef> {
        let target = self.storage.issue_upload(credential, bucket, key, mode).await?;
        if target.mode() != mode {
            return Err(PipelineError::Upload {
                key: key.to_string(),
                message: format!("requested {:?} URL but store issued {:?}", mode, target.mode()),
                details: None,
            });
        }
        debug!(%key, ?mode, "Issued upload URL");
        Ok(ArtifactRef::upload(bucket, key, target))
    }

    /// PUT the payload; staged uploads are completed right after with the
    /// payload's real length.
    #[instrument(skip(self, credential, artifact, payload), fields(key = %artifact.key, bytes = payload.len()))]
    pub async fn upload_bytes(&self, credential: &Credential, artifact: &ArtifactRef, payload: &[u8]) -> Result<()> {
        if artifact.direction != Direction::Upload {
            return Err(PipelineError::Upload {
                key: artifact.key.clone(),
                message: "artifact was staged for download".to_string(),
                details: None,
            });
        }

        self.storage.put_object(artifact, payload).await?;

        if artifact.mode() == TransferMode::Staged {
            self.complete_upload(credential, artifact, payload.len() as u64).await?;
        }

        info!("Uploaded artifact");
        Ok(())
    }

    /// Finalize a staged upload
    pub async fn complete_upload(&self, credential: &Credential, artifact: &ArtifactRef, byte_len: u64) -> Result<()> {
        let UploadTarget::Staged { upload_key, .. } = &artifact.target else {
            return Err(PipelineError::Upload {
                key: artifact.key.clone(),
                message: "single-shot uploads have no completion step".to_string(),
                details: None,
            });
        };

        self.storage
            .complete_upload(credential, &artifact.bucket, &artifact.key, upload_key, byte_len)
            .await
    }

    /// Request a read URL; `NotFound` if the key does not exist
    pub async fn begin_download(&self, credential: &Credential, bucket: &str, key: &str) -> Result<ArtifactRef> {
        let url = self.storage.issue_download(credential, bucket, key).await?;
        Ok(ArtifactRef::download(bucket, key, url))
    }

    /// GET the exact stored bytes. Decoding is left to the caller.
    pub async fn download_bytes(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        self.storage.get_object(artifact).await
    }
}
