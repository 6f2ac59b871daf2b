//! Job records and the payloads exchanged with clients.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::adapters::{EncodedOutput, OutputKind};
use crate::error::{ErrorKind, JobError};
use crate::jobs::state::JobState;
use crate::request::JobSpec;

/// Message returned with every accepted submission.
pub const ACCEPTED_MESSAGE: &str = "Transformation job has been accepted";

/// Opaque job identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self).map_err(|_| JobError::NotFound {
            job_id: s.to_string(),
        })
    }
}

/// An uploaded input artifact.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

impl Upload {
    #[must_use]
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Success {
        output: EncodedOutput,
        processing_time_seconds: f64,
        transformations_applied: Vec<String>,
    },
    Failure {
        kind: ErrorKind,
        message: String,
        processing_time_seconds: f64,
    },
}

impl JobResult {
    /// The state a job holding this result is in.
    #[must_use]
    pub fn terminal_state(&self) -> JobState {
        match self {
            JobResult::Success { .. } => JobState::Success,
            JobResult::Failure { .. } => JobState::Failure,
        }
    }

    #[must_use]
    pub fn output_kind(&self) -> Option<OutputKind> {
        match self {
            JobResult::Success { output, .. } => Some(output.kind()),
            JobResult::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn processing_time_seconds(&self) -> f64 {
        match self {
            JobResult::Success {
                processing_time_seconds,
                ..
            }
            | JobResult::Failure {
                processing_time_seconds,
                ..
            } => *processing_time_seconds,
        }
    }

    /// `"<kind>: <message>"` for failures.
    #[must_use]
    pub fn failure_detail(&self) -> Option<String> {
        match self {
            JobResult::Failure { kind, message, .. } => Some(format!("{kind}: {message}")),
            JobResult::Success { .. } => None,
        }
    }
}

/// A job as held by the store.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub state: JobState,
    pub spec: Arc<JobSpec>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    /// Monotonic instant the expiry window is counted from, set on completion.
    pub(crate) expiry_anchor: Option<Instant>,
}

impl JobRecord {
    /// A freshly submitted job.
    #[must_use]
    pub fn queued(id: JobId, spec: JobSpec) -> Self {
        Self {
            id,
            state: JobState::Queued,
            spec: Arc::new(spec),
            created_at: Utc::now(),
            finished_at: None,
            result: None,
            expiry_anchor: None,
        }
    }
}

/// Response to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: &'static str,
    pub message: &'static str,
}

impl SubmitReceipt {
    #[must_use]
    pub fn queued(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobState::Queued.as_label(),
            message: ACCEPTED_MESSAGE,
        }
    }
}

/// Response to a status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Where to fetch the result; only set on success.
    #[serde(rename = "output_url")]
    pub result_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A retrieved result.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    File {
        path: PathBuf,
        file_name: String,
        bytes: Bytes,
    },
    Inline(Value),
}

/// Counters of finished jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub completed: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_parsing() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!(matches!("not-a-job".parse::<JobId>(), Err(JobError::NotFound { .. })));
    }

    #[test]
    fn test_receipt_shape() {
        let id = JobId::new();
        let value = serde_json::to_value(SubmitReceipt::queued(id)).unwrap();
        assert_eq!(value["job_id"], id.to_string());
        assert_eq!(value["status"], "queued");
        assert_eq!(value["message"], ACCEPTED_MESSAGE);
    }

    #[test]
    fn test_failure_detail() {
        let result = JobResult::Failure {
            kind: ErrorKind::InvalidGeometryType,
            message: "union requires polygons".into(),
            processing_time_seconds: 0.5,
        };
        assert_eq!(result.terminal_state(), JobState::Failure);
        assert_eq!(result.output_kind(), None);
        assert_eq!(
            result.failure_detail().as_deref(),
            Some("InvalidGeometryType: union requires polygons")
        );
    }
}
