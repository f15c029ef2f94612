//! Core protocol logic.
//!
//! This module contains:
//! - Credentials: Token exchange
//! - Staging: Buckets, signed URLs and transfers
//! - Orchestrator: Work item submission and status polling
//! - Retrieval: Output fetching with visibility retries
//! - Poll: The shared polling primitive
//! - Pipeline: Extract/rename flows built from the above

pub mod credentials;
pub mod orchestrator;
pub mod pipeline;
pub mod poll;
pub mod retrieval;
pub mod staging;

// Re-export commonly used types
pub use credentials::{ClientIdentity, CredentialProvider};
pub use orchestrator::JobOrchestrator;
pub use pipeline::{LayerPipeline, LayerReport, PipelineSettings, RenameReport};
pub use poll::{poll_until, PollOutcome, PollPolicy};
pub use retrieval::ResultRetrieval;
pub use staging::{ArtifactStaging, BucketStatus};
