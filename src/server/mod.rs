//! HTTP surface for the layer pipeline.
//!
//! Routes:
//! - `POST /api/process-dwg` with `{"objectKey": "..."}`, reading the drawing
//!   from the configured input directory
//! - `POST /api/process-dwg/{objectKey}` with the drawing as the raw body
//! - `POST /api/rename-layers` with `{"objectKey": "...", "mappings": [...]}`
//! - `GET /health`

mod error;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::core::pipeline::validate_object_key;
use crate::core::{LayerPipeline, LayerReport, RenameReport};
use crate::domain::LayerMapping;
use crate::error::PipelineError;

pub use error::{status_for, ApiError, ErrorBody};

/// Largest drawing accepted in a request body
const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<LayerPipeline>,
    /// Directory `{objectKey}` requests are resolved against
    pub input_dir: PathBuf,
}

impl AppState {
    pub fn new(pipeline: Arc<LayerPipeline>, input_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            input_dir: input_dir.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    object_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameRequest {
    object_key: Option<String>,
    #[serde(default)]
    mappings: Vec<LayerMapping>,
}

#[derive(Debug, Serialize)]
struct Success<T> {
    success: bool,
    #[serde(flatten)]
    report: T,
}

impl<T> Success<T> {
    fn new(report: T) -> Json<Self> {
        Json(Self {
            success: true,
            report,
        })
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/process-dwg", post(process_by_key))
        .route("/api/process-dwg/{object_key}", post(process_upload))
        .route("/api/rename-layers", post(rename_layers))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C
pub async fn serve(bind: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;

    info!(addr = %bind, input_dir = %state.input_dir.display(), "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Parse an optional JSON body; an empty body counts as `{}`
fn parse_body<T: serde::de::DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| PipelineError::InvalidRequest(format!("malformed JSON body: {}", e)).into())
}

fn require_key(key: Option<String>) -> Result<String, ApiError> {
    match key {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ApiError::MissingObjectKey),
    }
}

/// Read `input_dir/key`
async fn read_input(state: &AppState, key: &str) -> Result<Vec<u8>, ApiError> {
    validate_object_key(key)?;
    let path = state.input_dir.join(key);
    tokio::fs::read(&path).await.map_err(|e| {
        PipelineError::Input(format!("{}: {}", path.display(), e)).into()
    })
}

/// Cancel in-flight polling when the client goes away
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    (cancel, guard)
}

async fn process_by_key(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Success<LayerReport>>, ApiError> {
    let request: ProcessRequest = parse_body(&body)?;
    let object_key = require_key(request.object_key)?;
    let payload = read_input(&state, &object_key).await?;

    let (cancel, _guard) = request_token();
    let report = state
        .pipeline
        .extract_layers(&object_key, payload, &cancel)
        .await?;
    Ok(Success::new(report))
}

async fn process_upload(
    State(state): State<AppState>,
    Path(object_key): Path<String>,
    body: Bytes,
) -> Result<Json<Success<LayerReport>>, ApiError> {
    let (cancel, _guard) = request_token();
    let report = state
        .pipeline
        .extract_layers(&object_key, body.to_vec(), &cancel)
        .await?;
    Ok(Success::new(report))
}

async fn rename_layers(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Success<RenameReport>>, ApiError> {
    let request: RenameRequest = serde_json::from_slice(&body)
        .map_err(|e| PipelineError::InvalidRequest(format!("malformed JSON body: {}", e)))?;
    let object_key = require_key(request.object_key)?;
    let payload = read_input(&state, &object_key).await?;

    let (cancel, _guard) = request_token();
    let report = state
        .pipeline
        .rename_layers(&object_key, payload, &request.mappings, &cancel)
        .await?;
    Ok(Success::new(report))
}
