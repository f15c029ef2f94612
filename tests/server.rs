//! HTTP Server Integration Tests
//!
//! Drives the axum router through axum-test with the fake vendor behind it.

mod common;

use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

use common::{pipeline, FakeConfig, FakeVendor};
use layerflow::domain::TransferMode;
use layerflow::server::{router, AppState};

const DRAWING: &[u8] = b"AC1032 fake drawing";

fn test_server(fake: &Arc<FakeVendor>) -> (TestServer, TempDir) {
    let input_dir = TempDir::new().unwrap();
    std::fs::write(input_dir.path().join("test.dwg"), DRAWING).unwrap();

    let state = AppState::new(
        Arc::new(pipeline(fake, TransferMode::SingleShot)),
        input_dir.path(),
    );
    let server = TestServer::new(router(state)).unwrap();
    (server, input_dir)
}

#[tokio::test(start_paused = true)]
async fn test_process_dwg_by_key_returns_layers() {
    let fake = FakeVendor::new(FakeConfig {
        in_progress_polls: 2,
        output_hidden_for: 2,
        ..FakeConfig::default()
    });
    let (server, _dir) = test_server(&fake);

    let response = server
        .post("/api/process-dwg")
        .json(&json!({ "objectKey": "test.dwg" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["objectKey"], "test.dwg");
    assert_eq!(body["layers"], json!(["0", "Walls", "Doors"]));
    assert!(body["workItemId"].is_string());
    assert_eq!(fake.object("test.dwg").unwrap(), DRAWING);
}

#[tokio::test(start_paused = true)]
async fn test_process_dwg_raw_body() {
    let fake = FakeVendor::new(FakeConfig::default());
    let (server, _dir) = test_server(&fake);

    let response = server
        .post("/api/process-dwg/upload.dwg")
        .bytes(Bytes::from_static(b"uploaded drawing"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["objectKey"], "upload.dwg");
    assert_eq!(fake.object("upload.dwg").unwrap(), b"uploaded drawing");
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_is_500_with_kind() {
    let fake = FakeVendor::new(FakeConfig {
        token_failure: Some(401),
        ..FakeConfig::default()
    });
    let (server, _dir) = test_server(&fake);

    let response = server
        .post("/api/process-dwg")
        .json(&json!({ "objectKey": "test.dwg" }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "AuthError");
    assert_eq!(body["details"]["errorCode"], "AUTH-001");
    assert_eq!(fake.calls(), vec!["request_token"]);
}

#[tokio::test]
async fn test_missing_object_key_is_400() {
    let fake = FakeVendor::new(FakeConfig::default());
    let (server, _dir) = test_server(&fake);

    let response = server.post("/api/process-dwg").json(&json!({})).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({ "error": "Missing objectKey" }));

    let response = server.post("/api/process-dwg").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_local_file_is_404() {
    let fake = FakeVendor::new(FakeConfig::default());
    let (server, _dir) = test_server(&fake);

    let response = server
        .post("/api/process-dwg")
        .json(&json!({ "objectKey": "missing.dwg" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "InputError");
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let fake = FakeVendor::new(FakeConfig::default());
    let (server, _dir) = test_server(&fake);

    let response = server
        .post("/api/process-dwg")
        .json(&json!({ "objectKey": "../etc/passwd" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "InvalidRequestError");
}

#[tokio::test(start_paused = true)]
async fn test_rename_layers_endpoint() {
    let fake = FakeVendor::new(FakeConfig::default());
    let (server, _dir) = test_server(&fake);

    let response = server
        .post("/api/rename-layers")
        .json(&json!({
            "objectKey": "test.dwg",
            "mappings": [
                { "from": "Walls", "to": "A-WALL" },
                { "from": "Doors", "to": "A-DOOR" }
            ]
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert!(body["downloadUrl"].as_str().unwrap().starts_with("https://store.test/get/"));
}

#[tokio::test]
async fn test_health() {
    let fake = FakeVendor::new(FakeConfig::default());
    let (server, _dir) = test_server(&fake);

    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "ok" }));
}
