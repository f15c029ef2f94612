//! Autodesk Platform Services adapter.
//!
//! Talks to the authentication, OSS (object storage) and Design Automation
//! REST endpoints over `reqwest`. Every non-2xx answer is turned into a typed
//! error that keeps the vendor's response body.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AuthApi, BucketCreation, StorageApi, WorkItemApi};
use crate::domain::{
    ArtifactRef, Credential, JobHandle, JobSpec, JobStatus, StatusReport, TransferMode,
    UploadTarget,
};
use crate::error::{vendor_details, PipelineError, Result};

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://developer.api.autodesk.com";

/// Where the vendor endpoints live
#[derive(Debug, Clone)]
pub struct ApsEndpoints {
    base: Url,
    /// Design Automation region, e.g. `us-east`
    region: String,
    /// Lifetime requested for signed URLs
    signed_url_minutes: u32,
}

impl ApsEndpoints {
    pub fn new(base_url: &str, region: impl Into<String>, signed_url_minutes: u32) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot carry a path: {}", base_url);
        }
        Ok(Self {
            base,
            region: region.into(),
            signed_url_minutes,
        })
    }

    /// Build an endpoint URL; each segment is percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn token(&self) -> Url {
        self.url(&["authentication", "v2", "token"])
    }

    fn bucket_details(&self, bucket: &str) -> Url {
        self.url(&["oss", "v2", "buckets", bucket, "details"])
    }

    fn buckets(&self) -> Url {
        self.url(&["oss", "v2", "buckets"])
    }

    fn object(&self, bucket: &str, key: &str, action: &str) -> Url {
        self.url(&["oss", "v2", "buckets", bucket, "objects", key, action])
    }

    fn workitems(&self) -> Url {
        self.url(&["da", &self.region, "v3", "workitems"])
    }

    fn workitem(&self, id: &str) -> Url {
        self.url(&["da", &self.region, "v3", "workitems", id])
    }
}

/// HTTP client for the vendor platform
pub struct ApsClient {
    endpoints: ApsEndpoints,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedResource {
    signed_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedS3Upload {
    upload_key: String,
    urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SignedS3Download {
    url: String,
}

#[derive(Debug, Deserialize)]
struct WorkItemCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkItemStatus {
    status: String,
    report_url: Option<String>,
}

/// Status code and body of a failed response
struct Failure {
    status: StatusCode,
    details: Option<serde_json::Value>,
}

impl Failure {
    async fn read(response: Response) -> Self {
        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                debug!(%status, error = %e, "Could not read error response body");
                Default::default()
            }
        };
        Self {
            status,
            details: vendor_details(&body),
        }
    }

    fn message(&self) -> String {
        format!("HTTP {}", self.status)
    }

    /// True if the vendor says the bucket is already there
    fn is_bucket_conflict(&self) -> bool {
        if self.status == StatusCode::CONFLICT {
            return true;
        }
        self.details
            .as_ref()
            .and_then(|d| d.get("reason"))
            .and_then(|r| r.as_str())
            .map(|r| r.eq_ignore_ascii_case("Bucket already exists"))
            .unwrap_or(false)
    }
}

impl ApsClient {
    pub fn new(endpoints: ApsEndpoints) -> Self {
        Self {
            endpoints,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoints(&self) -> &ApsEndpoints {
        &self.endpoints
    }

    /// Read a full body as bytes, then decode JSON from the buffer
    async fn json_body<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::decode(what, e))?;
        serde_json::from_slice(&body).map_err(|e| PipelineError::decode(what, e))
    }

    fn vendor(operation: &str, err: reqwest::Error) -> PipelineError {
        PipelineError::Vendor {
            operation: operation.to_string(),
            message: err.to_string(),
            details: None,
        }
    }

    fn upload_error(key: &str, message: impl Into<String>, details: Option<serde_json::Value>) -> PipelineError {
        PipelineError::Upload {
            key: key.to_string(),
            message: message.into(),
            details,
        }
    }

    async fn issue_single_shot(&self, credential: &Credential, bucket: &str, key: &str) -> Result<UploadTarget> {
        let mut url = self.endpoints.object(bucket, key, "signed");
        url.query_pairs_mut().append_pair("access", "readwrite");

        let response = self
            .client
            .post(url)
            .bearer_auth(credential.token())
            .json(&json!({ "minutesExpiration": self.endpoints.signed_url_minutes }))
            .send()
            .await
            .map_err(|e| Self::upload_error(key, e.to_string(), None))?;

        if !response.status().is_success() {
            let failure = Failure::read(response).await;
            return Err(Self::upload_error(key, failure.message(), failure.details));
        }

        let signed: SignedResource = Self::json_body(response, "signed URL response").await?;
        Ok(UploadTarget::SingleShot {
            url: signed.signed_url,
        })
    }

    async fn issue_staged(&self, credential: &Credential, bucket: &str, key: &str) -> Result<UploadTarget> {
        let mut url = self.endpoints.object(bucket, key, "signeds3upload");
        url.query_pairs_mut()
            .append_pair("minutesExpiration", &self.endpoints.signed_url_minutes.to_string());

        let response = self
            .client
            .get(url)
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| Self::upload_error(key, e.to_string(), None))?;

        if !response.status().is_success() {
            let failure = Failure::read(response).await;
            return Err(Self::upload_error(key, failure.message(), failure.details));
        }

        let signed: SignedS3Upload = Self::json_body(response, "signed S3 upload response").await?;
        let url = signed
            .urls
            .into_iter()
            .next()
            .ok_or_else(|| Self::upload_error(key, "store returned no upload URL", None))?;

        Ok(UploadTarget::Staged {
            url,
            upload_key: signed.upload_key,
        })
    }
}

#[async_trait]
impl AuthApi for ApsClient {
    async fn request_token(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &[String],
    ) -> Result<Credential> {
        let scope = scopes.join(" ");
        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
            ("scope", scope.as_str()),
        ];

        let response = self
            .client
            .post(self.endpoints.token())
            .form(&form)
            .send()
            .await
            .map_err(|e| PipelineError::Auth {
                message: e.to_string(),
                details: None,
            })?;

        if !response.status().is_success() {
            let failure = Failure::read(response).await;
            return Err(PipelineError::Auth {
                message: failure.message(),
                details: failure.details,
            });
        }

        let body = response.bytes().await.map_err(|e| PipelineError::Auth {
            message: e.to_string(),
            details: None,
        })?;
        serde_json::from_slice::<Credential>(&body).map_err(|e| PipelineError::Auth {
            message: format!("malformed token payload: {}", e),
            details: vendor_details(&body),
        })
    }
}

#[async_trait]
impl StorageApi for ApsClient {
    async fn bucket_exists(&self, credential: &Credential, bucket: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.endpoints.bucket_details(bucket))
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| PipelineError::Bucket {
                bucket: bucket.to_string(),
                message: e.to_string(),
                details: None,
            })?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => {
                let failure = Failure::read(response).await;
                Err(PipelineError::Bucket {
                    bucket: bucket.to_string(),
                    message: failure.message(),
                    details: failure.details,
                })
            }
        }
    }

    async fn create_bucket(
        &self,
        credential: &Credential,
        bucket: &str,
        policy: &str,
    ) -> Result<BucketCreation> {
        let response = self
            .client
            .post(self.endpoints.buckets())
            .bearer_auth(credential.token())
            .json(&json!({ "bucketKey": bucket, "policyKey": policy }))
            .send()
            .await
            .map_err(|e| PipelineError::Bucket {
                bucket: bucket.to_string(),
                message: e.to_string(),
                details: None,
            })?;

        if response.status().is_success() {
            return Ok(BucketCreation::Created);
        }

        let failure = Failure::read(response).await;
        if failure.is_bucket_conflict() {
            return Ok(BucketCreation::AlreadyExists);
        }
        Err(PipelineError::Bucket {
            bucket: bucket.to_string(),
            message: failure.message(),
            details: failure.details,
        })
    }

    async fn issue_upload(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        mode: TransferMode,
    ) -> Result<UploadTarget> {
        match mode {
            TransferMode::SingleShot => self.issue_single_shot(credential, bucket, key).await,
            TransferMode::Staged => self.issue_staged(credential, bucket, key).await,
        }
    }

    async fn put_object(&self, artifact: &ArtifactRef, payload: &[u8]) -> Result<()> {
        debug!(key = %artifact.key, bytes = payload.len(), "PUT to signed URL");

        let response = self
            .client
            .put(artifact.url())
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| Self::upload_error(&artifact.key, e.to_string(), None))?;

        if !response.status().is_success() {
            let failure = Failure::read(response).await;
            return Err(Self::upload_error(&artifact.key, failure.message(), failure.details));
        }
        Ok(())
    }

    async fn complete_upload(
        &self,
        credential: &Credential,
        bucket: &str,
        key: &str,
        upload_key: &str,
        size: u64,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.endpoints.object(bucket, key, "signeds3upload"))
            .bearer_auth(credential.token())
            .json(&json!({ "uploadKey": upload_key, "size": size }))
            .send()
            .await
            .map_err(|e| Self::upload_error(key, e.to_string(), None))?;

        if !response.status().is_success() {
            let failure = Failure::read(response).await;
            return Err(Self::upload_error(key, failure.message(), failure.details));
        }
        Ok(())
    }

    async fn issue_download(&self, credential: &Credential, bucket: &str, key: &str) -> Result<String> {
        let response = self
            .client
            .get(self.endpoints.object(bucket, key, "signeds3download"))
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| Self::vendor("signeds3download", e))?;

        match response.status() {
            s if s.is_success() => {
                let signed: SignedS3Download =
                    Self::json_body(response, "signed S3 download response").await?;
                Ok(signed.url)
            }
            StatusCode::NOT_FOUND => {
                let failure = Failure::read(response).await;
                Err(PipelineError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    details: failure.details,
                })
            }
            _ => {
                let failure = Failure::read(response).await;
                Err(PipelineError::Vendor {
                    operation: "signeds3download".to_string(),
                    message: failure.message(),
                    details: failure.details,
                })
            }
        }
    }

    async fn get_object(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        // Bytes only: no content-type driven decoding of the body.
        let response = self
            .client
            .get(artifact.url())
            .send()
            .await
            .map_err(|e| Self::vendor("download", e))?;

        match response.status() {
            s if s.is_success() => {
                let body = response.bytes().await.map_err(|e| Self::vendor("download", e))?;
                Ok(body.to_vec())
            }
            StatusCode::NOT_FOUND => {
                let failure = Failure::read(response).await;
                Err(PipelineError::NotFound {
                    bucket: artifact.bucket.clone(),
                    key: artifact.key.clone(),
                    details: failure.details,
                })
            }
            _ => {
                let failure = Failure::read(response).await;
                Err(PipelineError::Vendor {
                    operation: "download".to_string(),
                    message: failure.message(),
                    details: failure.details,
                })
            }
        }
    }
}

#[async_trait]
impl WorkItemApi for ApsClient {
    async fn submit(&self, credential: &Credential, spec: &JobSpec) -> Result<JobHandle> {
        let response = self
            .client
            .post(self.endpoints.workitems())
            .bearer_auth(credential.token())
            .json(spec)
            .send()
            .await
            .map_err(|e| PipelineError::Submission {
                message: e.to_string(),
                details: None,
            })?;

        if !response.status().is_success() {
            let failure = Failure::read(response).await;
            return Err(PipelineError::Submission {
                message: failure.message(),
                details: failure.details,
            });
        }

        let created: WorkItemCreated = Self::json_body(response, "work item response").await?;
        Ok(JobHandle::submitted(created.id, spec.activity_id.clone()))
    }

    async fn status(&self, credential: &Credential, job_id: &str) -> Result<StatusReport> {
        let response = self
            .client
            .get(self.endpoints.workitem(job_id))
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| Self::vendor("workitem status", e))?;

        if !response.status().is_success() {
            let failure = Failure::read(response).await;
            return Err(PipelineError::Vendor {
                operation: "workitem status".to_string(),
                message: failure.message(),
                details: failure.details,
            });
        }

        let status: WorkItemStatus = Self::json_body(response, "work item status").await?;
        Ok(StatusReport {
            status: JobStatus::from_vendor(&status.status),
            report_url: status.report_url,
        })
    }

    async fn fetch_report(&self, report_url: &str) -> Result<String> {
        let response = self
            .client
            .get(report_url)
            .send()
            .await
            .map_err(|e| Self::vendor("report", e))?;

        if !response.status().is_success() {
            let failure = Failure::read(response).await;
            return Err(PipelineError::Vendor {
                operation: "report".to_string(),
                message: failure.message(),
                details: failure.details,
            });
        }

        let body = response.bytes().await.map_err(|e| Self::vendor("report", e))?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
