//! Artifacts staged in the remote object store.
//!
//! An artifact is addressed by bucket and key, and transferred through a
//! pre-signed, time-limited URL. Upload URLs come in two flavors that must
//! never be mixed for the same object.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// How an upload URL is finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// One PUT creates the object atomically
    SingleShot,

    /// PUT followed by an explicit completion call carrying the byte count
    Staged,
}

impl Default for TransferMode {
    fn default() -> Self {
        Self::SingleShot
    }
}

/// Signed write location issued by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UploadTarget {
    SingleShot { url: String },
    Staged { url: String, upload_key: String },
}

impl UploadTarget {
    /// The URL the payload is PUT to
    pub fn url(&self) -> &str {
        match self {
            Self::SingleShot { url } | Self::Staged { url, .. } => url,
        }
    }

    pub fn mode(&self) -> TransferMode {
        match self {
            Self::SingleShot { .. } => TransferMode::SingleShot,
            Self::Staged { .. } => TransferMode::Staged,
        }
    }
}

/// Transfer direction of an artifact reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upload,
    Download,
}

/// A staged object plus the signed URL used to move its bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Bucket (container) holding the object
    pub bucket: String,

    /// Object key, unique within the bucket
    pub key: String,

    pub direction: Direction,

    /// Signed URL and finalization flavor. Downloads are always single-shot.
    pub target: UploadTarget,
}

impl ArtifactRef {
    /// Reference to an object about to be written
    pub fn upload(bucket: impl Into<String>, key: impl Into<String>, target: UploadTarget) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            direction: Direction::Upload,
            target,
        }
    }

    /// Reference to an existing object readable at `url`
    pub fn download(bucket: impl Into<String>, key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            direction: Direction::Download,
            target: UploadTarget::SingleShot { url: url.into() },
        }
    }

    pub fn url(&self) -> &str {
        self.target.url()
    }

    pub fn mode(&self) -> TransferMode {
        self.target.mode()
    }
}

/// Output of a remote job, fetched once the object became visible
#[derive(Debug, Clone)]
pub struct ResultArtifact {
    /// Bytes exactly as stored
    pub raw: Vec<u8>,

    /// JSON decoded from `raw`
    pub payload: Value,
}

impl ResultArtifact {
    /// Decode a complete byte buffer as JSON.
    ///
    /// A leading UTF-8 byte order mark is skipped.
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self> {
        let body = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&raw);
        let payload = serde_json::from_slice(body)
            .map_err(|e| PipelineError::decode("result payload", e))?;
        Ok(Self { raw, payload })
    }

    /// Decode the payload into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| PipelineError::decode(std::any::type_name::<T>(), e))
    }

    pub fn size_bytes(&self) -> u64 {
        self.raw.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_target_mode() {
        let single = UploadTarget::SingleShot {
            url: "https://s3/put".to_string(),
        };
        let staged = UploadTarget::Staged {
            url: "https://s3/part1".to_string(),
            upload_key: "abc".to_string(),
        };

        assert_eq!(single.mode(), TransferMode::SingleShot);
        assert_eq!(staged.mode(), TransferMode::Staged);
        assert_eq!(staged.url(), "https://s3/part1");
    }

    #[test]
    fn test_download_ref_is_single_shot() {
        let artifact = ArtifactRef::download("bucket", "layers.json", "https://s3/get");
        assert_eq!(artifact.direction, Direction::Download);
        assert_eq!(artifact.mode(), TransferMode::SingleShot);
        assert_eq!(artifact.url(), "https://s3/get");
    }

    #[test]
    fn test_result_decoding_strips_bom() {
        let mut raw = b"\xEF\xBB\xBF".to_vec();
        raw.extend_from_slice(br#"["0", "Walls"]"#);

        let result = ResultArtifact::from_bytes(raw).unwrap();
        let layers: Vec<String> = result.decode().unwrap();

        assert_eq!(layers, vec!["0", "Walls"]);
        assert_eq!(result.size_bytes(), 17);
    }

    #[test]
    fn test_result_decoding_rejects_garbage() {
        let err = ResultArtifact::from_bytes(b"not json".to_vec()).unwrap_err();
        assert_eq!(err.kind(), "DecodeError");

        let result = ResultArtifact::from_bytes(br#"{"layers": 3}"#.to_vec()).unwrap();
        assert!(result.decode::<Vec<String>>().is_err());
    }
}
