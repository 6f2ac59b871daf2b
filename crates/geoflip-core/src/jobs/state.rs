//! Job lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a job is in its lifecycle.
///
/// `Success` and `Failure` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Started,
    Processing { phase: String },
    Success,
    Failure,
}

impl JobState {
    /// Returns `true` when the machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        use JobState::{Failure, Processing, Queued, Started, Success};
        matches!(
            (self, next),
            (Queued, Started)
                | (Started | Processing { .. }, Processing { .. } | Success | Failure)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }

    /// Status label reported to clients.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Started => "started",
            JobState::Processing { .. } => "processing",
            JobState::Success => "success",
            JobState::Failure => "failure",
        }
    }

    /// The phase message while processing.
    #[must_use]
    pub fn phase(&self) -> Option<&str> {
        match self {
            JobState::Processing { phase } => Some(phase),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Processing { phase } => write!(f, "processing ({phase})"),
            other => f.write_str(other.as_label()),
        }
    }
}
