//! layerflow - Remote CAD layer extraction over a job-submission protocol
//!
//! Drives a vendor's hosted CAD automation service: stage a drawing in
//! object storage through signed URLs, submit a work item that references
//! it, poll the work item to a terminal state, and fetch the output once
//! the store makes it visible.
//!
//! # Architecture
//!
//! - Credential Provider: client identity to bearer token
//! - Artifact Staging: buckets, signed URLs, single-shot or staged uploads
//! - Job Orchestrator: submission and bounded status polling
//! - Result Retrieval: output download with visibility retries
//!
//! All vendor traffic goes through the traits in `adapters`, so each stage
//! can be exercised against an in-memory fake.
//!
//! # Modules
//!
//! - `adapters`: Vendor interfaces and the HTTP client
//! - `core`: Protocol stages, polling primitive, pipelines
//! - `domain`: Data structures (Credential, ArtifactRef, JobSpec, JobHandle)
//! - `server`: axum HTTP surface
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Extract layers from a drawing
//! layerflow extract test.dwg
//!
//! # Serve the HTTP API
//! layerflow serve --bind 127.0.0.1:3000
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod server;

// Re-export main types at crate root for convenience
pub use core::{LayerPipeline, LayerReport, PipelineSettings, PollPolicy, RenameReport};
pub use domain::{ArtifactRef, Credential, JobHandle, JobSpec, JobStatus, UploadTarget};
pub use error::{PipelineError, Result};
