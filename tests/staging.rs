//! Artifact Staging Integration Tests
//!
//! Upload/download round trips through the in-memory store, in both
//! transfer modes.

mod common;

use common::{credential, staging, BucketBehavior, FakeConfig, FakeVendor, BUCKET};
use layerflow::core::BucketStatus;
use layerflow::domain::{Direction, TransferMode};
use layerflow::error::PipelineError;

async fn round_trip(mode: TransferMode, payload: &[u8]) -> Vec<u8> {
    let fake = FakeVendor::new(FakeConfig::default());
    let staging = staging(&fake, mode);
    let cred = credential();

    let upload = staging.begin_upload(&cred, BUCKET, "plan.dwg").await.unwrap();
    assert_eq!(upload.mode(), mode);
    staging.upload_bytes(&cred, &upload, payload).await.unwrap();

    let download = staging.begin_download(&cred, BUCKET, "plan.dwg").await.unwrap();
    assert_eq!(download.direction, Direction::Download);
    staging.download_bytes(&download).await.unwrap()
}

#[tokio::test]
async fn test_single_shot_round_trip() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    assert_eq!(round_trip(TransferMode::SingleShot, &payload).await, payload);
}

#[tokio::test]
async fn test_staged_round_trip() {
    // Not valid UTF-8 on purpose
    let payload = vec![0xAC, 0x10, 0x00, 0xFF, 0xFE, 0x0D, 0x0A, 0x00];
    assert_eq!(round_trip(TransferMode::Staged, &payload).await, payload);
}

#[tokio::test]
async fn test_staged_completion_carries_payload_length() {
    let fake = FakeVendor::new(FakeConfig::default());
    let staging = staging(&fake, TransferMode::Staged);
    let cred = credential();

    for (key, len) in [("a.dwg", 1usize), ("b.dwg", 4097), ("c.dwg", 123_457)] {
        let payload = vec![7u8; len];
        let upload = staging.begin_upload(&cred, BUCKET, key).await.unwrap();
        staging.upload_bytes(&cred, &upload, &payload).await.unwrap();
    }

    assert_eq!(fake.completion_sizes(), vec![1, 4097, 123_457]);
}

#[tokio::test]
async fn test_single_shot_skips_completion() {
    let fake = FakeVendor::new(FakeConfig::default());
    let staging = staging(&fake, TransferMode::SingleShot);
    let cred = credential();

    let upload = staging.begin_upload(&cred, BUCKET, "plan.dwg").await.unwrap();
    staging.upload_bytes(&cred, &upload, b"drawing").await.unwrap();

    assert_eq!(fake.count("complete_upload"), 0);
    assert_eq!(fake.object("plan.dwg").unwrap(), b"drawing");

    let err = staging.complete_upload(&cred, &upload, 7).await.unwrap_err();
    assert_eq!(err.kind(), "UploadError");
}

#[tokio::test]
async fn test_download_refs_cannot_be_uploaded_to() {
    let fake = FakeVendor::new(FakeConfig::default());
    fake.insert_object("plan.dwg", b"drawing");
    let staging = staging(&fake, TransferMode::SingleShot);
    let cred = credential();

    let download = staging.begin_download(&cred, BUCKET, "plan.dwg").await.unwrap();
    let err = staging.upload_bytes(&cred, &download, b"x").await.unwrap_err();

    assert!(matches!(err, PipelineError::Upload { .. }));
    assert_eq!(fake.count("put_object"), 0);
}

#[tokio::test]
async fn test_missing_object_is_not_found() {
    let fake = FakeVendor::new(FakeConfig::default());
    let staging = staging(&fake, TransferMode::SingleShot);

    let err = staging
        .begin_download(&credential(), BUCKET, "missing.dwg")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.details().is_some());
}

#[tokio::test]
async fn test_ensure_bucket_variants() {
    let cred = credential();

    let fake = FakeVendor::new(FakeConfig::default());
    let status = staging(&fake, TransferMode::SingleShot)
        .ensure_bucket(&cred, BUCKET)
        .await
        .unwrap();
    assert_eq!(status, BucketStatus::Existing);
    assert_eq!(fake.count("create_bucket"), 0);

    let fake = FakeVendor::new(FakeConfig {
        bucket: BucketBehavior::Absent,
        ..FakeConfig::default()
    });
    let status = staging(&fake, TransferMode::SingleShot)
        .ensure_bucket(&cred, BUCKET)
        .await
        .unwrap();
    assert_eq!(status, BucketStatus::Created);

    let fake = FakeVendor::new(FakeConfig {
        bucket: BucketBehavior::Conflict,
        ..FakeConfig::default()
    });
    let status = staging(&fake, TransferMode::SingleShot)
        .ensure_bucket(&cred, BUCKET)
        .await
        .unwrap();
    assert_eq!(status, BucketStatus::AlreadyExists);
}
