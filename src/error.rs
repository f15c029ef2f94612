//! Error taxonomy for the remote job protocol.
//!
//! Every variant that originates from a vendor response keeps the vendor's
//! own payload in `details`, since it is usually the only diagnostic signal.

use serde_json::Value;
use thiserror::Error;

use crate::domain::JobStatus;

/// Result alias used throughout the library
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Errors surfaced by the pipeline stages
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Authentication failed: {message}")]
    Auth {
        message: String,
        details: Option<Value>,
    },

    #[error("Bucket '{bucket}' could not be ensured: {message}")]
    Bucket {
        bucket: String,
        message: String,
        details: Option<Value>,
    },

    #[error("Upload of '{key}' failed: {message}")]
    Upload {
        key: String,
        message: String,
        details: Option<Value>,
    },

    #[error("Object '{key}' not found in bucket '{bucket}'")]
    NotFound {
        bucket: String,
        key: String,
        details: Option<Value>,
    },

    #[error("Work item submission rejected: {message}")]
    Submission {
        message: String,
        details: Option<Value>,
    },

    #[error("Work item {job_id} still {last_status} after {attempts} polls")]
    JobTimeout {
        job_id: String,
        attempts: u32,
        last_status: JobStatus,
    },

    #[error("Work item {job_id} finished with status '{status}'")]
    JobFailed {
        job_id: String,
        status: String,
        report_url: Option<String>,
        details: Option<Value>,
    },

    #[error("Result '{key}' not available in bucket '{bucket}' after {attempts} attempts")]
    ResultNotAvailable {
        bucket: String,
        key: String,
        attempts: u32,
    },

    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("Vendor call '{operation}' failed: {message}")]
    Vendor {
        operation: String,
        message: String,
        details: Option<Value>,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Input file unavailable: {0}")]
    Input(String),

    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),
}

impl PipelineError {
    /// Stable error kind name used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "AuthError",
            Self::Bucket { .. } => "BucketError",
            Self::Upload { .. } => "UploadError",
            Self::NotFound { .. } => "NotFoundError",
            Self::Submission { .. } => "SubmissionError",
            Self::JobTimeout { .. } => "JobTimeoutError",
            Self::JobFailed { .. } => "JobFailedError",
            Self::ResultNotAvailable { .. } => "ResultNotAvailable",
            Self::Decode { .. } => "DecodeError",
            Self::Vendor { .. } => "VendorError",
            Self::InvalidRequest(_) => "InvalidRequestError",
            Self::Input(_) => "InputError",
            Self::Cancelled(_) => "CancelledError",
        }
    }

    /// Vendor payload attached to the error, if any
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Auth { details, .. }
            | Self::Bucket { details, .. }
            | Self::Upload { details, .. }
            | Self::NotFound { details, .. }
            | Self::Submission { details, .. }
            | Self::JobFailed { details, .. }
            | Self::Vendor { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// True when the error means the object is not (yet) visible in the store
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn decode(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }
}

/// Turn a vendor response body into a JSON detail value.
///
/// Bodies that are not JSON are kept verbatim as a JSON string.
pub fn vendor_details(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(body).into_owned())),
    }
}
