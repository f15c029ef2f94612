//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::PipelineError;

/// JSON body of every non-2xx answer
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error kind, e.g. `AuthError`
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Vendor payload, passed through untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Handler error
#[derive(Debug)]
pub enum ApiError {
    /// Request without an `objectKey`
    MissingObjectKey,
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

/// Status code for a pipeline error
pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PipelineError::Input(_) => StatusCode::NOT_FOUND,
        PipelineError::Cancelled(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingObjectKey => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: "Missing objectKey".to_string(),
                    message: None,
                    details: None,
                }),
            )
                .into_response(),
            Self::Pipeline(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    error!(kind = err.kind(), error = %err, "Request failed");
                }
                let body = ErrorBody {
                    error: err.kind().to_string(),
                    message: Some(err.to_string()),
                    details: err.details().cloned(),
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
