//! Domain types for the remote job protocol.
//!
//! This module contains the core data structures:
//! - Credential: Short-lived bearer token
//! - Artifact: Staged objects and their signed URLs
//! - Job: Work item specs, handles and status
//! - Mapping: Layer rename mappings

pub mod artifact;
pub mod credential;
pub mod job;
pub mod mapping;

// Re-export commonly used types
pub use artifact::{ArtifactRef, Direction, ResultArtifact, TransferMode, UploadTarget};
pub use credential::Credential;
pub use job::{JobArgument, JobHandle, JobSpec, JobStatus, StatusReport, Verb};
pub use mapping::LayerMapping;
