//! Adapter interfaces for the vendor platform.
//!
//! Each trait covers one vendor service. The pipeline only talks to these
//! traits, so tests swap in in-memory fakes and the HTTP client stays a
//! single implementation (`ApsClient`).

pub mod aps;

use async_trait::async_trait;

use crate::domain::{
    ArtifactRef, Credential, JobHandle, JobSpec, StatusReport, TransferMode, UploadTarget,
};
use crate::error::Result;

// Re-export the HTTP implementation
pub use aps::{ApsClient, ApsEndpoints};

/// Answer to a bucket creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketCreation {
    Created,
    /// Someone else created it first; treated as success
    AlreadyExists,
}

/// Identity exchange
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange client credentials for a bearer token
    async fn request_token(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &[String],
    ) -> Result<Credential>;
}

/// Object storage with signed URLs
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Returns false when the bucket does not exist
    async fn bucket_exists(&self, credential: &Credential, bucket: &str) -> Result<bool>;

    async fn create_bucket(
        &self,
        credential: &Credential,
        bucket: &str,
        policy: &str,
    ) -> Result<BucketCreation>;

    /// Issue a write URL of the requested flavor
    async fn issue_upload(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        mode: TransferMode,
    ) -> Result<UploadTarget>;

    /// PUT bytes to the artifact's signed URL (no credential: the URL is
    /// pre-authorized)
    async fn put_object(&self, artifact: &ArtifactRef, payload: &[u8]) -> Result<()>;

    /// Finalize a staged upload with the number of bytes transferred
    async fn complete_upload(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        upload_key: &str,
        size: u64,
    ) -> Result<()>;

    /// Issue a read URL; `NotFound` when the object is not visible
    async fn issue_download(&self, credential: &Credential, bucket: &str, key: &str) -> Result<String>;

    /// GET the exact bytes behind the artifact's signed URL; `NotFound` on 404
    async fn get_object(&self, artifact: &ArtifactRef) -> Result<Vec<u8>>;
}

/// Remote batch execution
#[async_trait]
pub trait WorkItemApi: Send + Sync {
    async fn submit(&self, credential: &Credential, spec: &JobSpec) -> Result<JobHandle>;

    async fn status(&self, credential: &Credential, job_id: &str) -> Result<StatusReport>;

    /// Download the human-readable job report
    async fn fetch_report(&self, report_url: &str) -> Result<String>;
}
