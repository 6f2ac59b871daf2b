//! Asynchronous job lifecycle: submission, execution, status, results and cleanup.

mod cleanup;
mod model;
mod orchestrator;
mod state;
mod store;

pub use cleanup::{cleanup_job, schedule_cleanup};
pub use model::{
    ACCEPTED_MESSAGE, JobId, JobOutput, JobRecord, JobResult, JobStatus, QueueStats, SubmitReceipt, Upload,
};
pub use orchestrator::{JobOrchestrator, PHASE_READING, PHASE_TRANSFORMING, PHASE_WRITING, run_job};
pub use state::JobState;
pub use store::{InMemoryJobStore, JobStore};
