//! Remote work items: what gets submitted and how its status evolves.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::{ArtifactRef, Direction, TransferMode};
use crate::error::{PipelineError, Result};

/// Access verb the remote job uses for an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// The job downloads the artifact
    Get,

    /// The job uploads the artifact
    Put,
}

/// One named argument of a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobArgument {
    pub url: String,
    pub verb: Verb,
}

/// Work item description, serialized as the submission body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Fully qualified activity id (`nickname.Activity+alias`)
    pub activity_id: String,

    /// Role name -> argument
    pub arguments: BTreeMap<String, JobArgument>,
}

impl JobSpec {
    pub fn new(activity_id: impl Into<String>) -> Self {
        Self {
            activity_id: activity_id.into(),
            arguments: BTreeMap::new(),
        }
    }

    /// Add an argument the job reads from.
    ///
    /// The artifact must carry a read URL.
    pub fn with_input(mut self, role: &str, artifact: &ArtifactRef) -> Result<Self> {
        if artifact.direction != Direction::Download {
            return Err(PipelineError::Submission {
                message: format!(
                    "argument '{}' needs a read URL but '{}' was staged for upload",
                    role, artifact.key
                ),
                details: None,
            });
        }
        self.insert(role, artifact, Verb::Get)?;
        Ok(self)
    }

    /// Add an argument the job writes to.
    ///
    /// The remote job performs a single PUT and cannot complete a staged
    /// upload, so only single-shot upload targets are accepted.
    pub fn with_output(mut self, role: &str, artifact: &ArtifactRef) -> Result<Self> {
        if artifact.direction != Direction::Upload || artifact.mode() != TransferMode::SingleShot {
            return Err(PipelineError::Submission {
                message: format!(
                    "argument '{}' needs a single-shot write URL for '{}'",
                    role, artifact.key
                ),
                details: None,
            });
        }
        self.insert(role, artifact, Verb::Put)?;
        Ok(self)
    }

    fn insert(&mut self, role: &str, artifact: &ArtifactRef, verb: Verb) -> Result<()> {
        if role.is_empty() {
            return Err(PipelineError::Submission {
                message: "argument role cannot be empty".to_string(),
                details: None,
            });
        }
        if self.arguments.contains_key(role) {
            return Err(PipelineError::Submission {
                message: format!("argument '{}' given twice", role),
                details: None,
            });
        }
        self.arguments.insert(
            role.to_string(),
            JobArgument {
                url: artifact.url().to_string(),
                verb,
            },
        );
        Ok(())
    }
}

/// Status of a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Success,
    /// Any failure or cancellation; keeps the vendor's status string
    Failed { reason: String },
}

impl JobStatus {
    /// Map a vendor status string
    pub fn from_vendor(status: &str) -> Self {
        match status {
            "pending" => Self::Pending,
            "inprogress" => Self::InProgress,
            "success" => Self::Success,
            other => Self::Failed {
                reason: other.to_string(),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed { .. })
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "inprogress"),
            Self::Success => write!(f, "success"),
            Self::Failed { reason } => write!(f, "{}", reason),
        }
    }
}

/// A single status poll result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: JobStatus,
    pub report_url: Option<String>,
}

/// Client-side view of a submitted work item.
///
/// Plain data with no ties to the task that created it, so several handles
/// can be polled independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub activity_id: String,
    pub status: JobStatus,

    /// Diagnostics report, set by the vendor when the job finishes
    pub report_url: Option<String>,

    pub submitted_at: DateTime<Utc>,

    /// Number of status polls applied so far
    pub polls: u32,
}

impl JobHandle {
    /// Handle for a freshly submitted work item
    pub fn submitted(id: impl Into<String>, activity_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            activity_id: activity_id.into(),
            status: JobStatus::Pending,
            report_url: None,
            submitted_at: Utc::now(),
            polls: 0,
        }
    }

    /// Apply a poll result. Returns false, leaving the handle untouched, once
    /// the handle is terminal.
    pub fn apply(&mut self, report: StatusReport) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.polls += 1;
        self.status = report.status;
        if report.report_url.is_some() {
            self.report_url = report.report_url;
        }
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
