//! Job state and result storage.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::{JobError, Result};
use crate::jobs::model::{JobId, JobRecord, JobResult};
use crate::jobs::state::JobState;

/// Storage for job records.
///
/// A stored result is written once, together with the terminal state, and
/// never changes afterwards. Records expire a fixed window after they finish
/// and then read as unknown; unfinished jobs never expire.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    /// Store a newly submitted job.
    async fn insert(&self, record: JobRecord) -> Result<()>;

    /// Snapshot of a job.
    async fn get(&self, id: &JobId) -> Result<JobRecord>;

    /// Move a job to a non-terminal state.
    async fn transition(&self, id: &JobId, next: JobState) -> Result<()>;

    /// Record the terminal result of a job.
    async fn complete(&self, id: &JobId, result: JobResult) -> Result<()>;

    /// Drop expired records, returning how many were removed.
    async fn purge_expired(&self) -> usize;
}

/// Process-local store on a concurrent map.
#[derive(Debug)]
pub struct InMemoryJobStore {
    records: DashMap<JobId, JobRecord>,
    expiry: Duration,
}

impl InMemoryJobStore {
    #[must_use]
    pub fn new(expiry: Duration) -> Self {
        Self {
            records: DashMap::new(),
            expiry,
        }
    }

    fn is_expired(&self, record: &JobRecord, now: Instant) -> bool {
        record
            .expiry_anchor
            .is_some_and(|anchor| now.saturating_duration_since(anchor) >= self.expiry)
    }

    fn not_found(id: &JobId) -> JobError {
        JobError::NotFound {
            job_id: id.to_string(),
        }
    }

    fn invalid_transition(record: &JobRecord, next: &JobState) -> JobError {
        JobError::InvalidTransition {
            job_id: record.id.to_string(),
            from: record.state.to_string(),
            to: next.to_string(),
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, record: JobRecord) -> Result<()> {
        log::debug!("job_id: {} - stored as {}", record.id, record.state);
        self.records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<JobRecord> {
        let now = Instant::now();
        let record = self.records.get(id).ok_or_else(|| Self::not_found(id))?;
        if self.is_expired(&record, now) {
            drop(record);
            self.records.remove(id);
            log::debug!("job_id: {id} - record expired");
            return Err(Self::not_found(id).into());
        }
        Ok(record.clone())
    }

    async fn transition(&self, id: &JobId, next: JobState) -> Result<()> {
        let mut record = self.records.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        if next.is_terminal() || !record.state.can_transition_to(&next) {
            return Err(Self::invalid_transition(&record, &next).into());
        }
        log::info!("job_id: {id} - {} -> {next}", record.state);
        record.state = next;
        Ok(())
    }

    async fn complete(&self, id: &JobId, result: JobResult) -> Result<()> {
        let mut record = self.records.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        let next = result.terminal_state();
        if record.result.is_some() || !record.state.can_transition_to(&next) {
            return Err(Self::invalid_transition(&record, &next).into());
        }
        log::info!("job_id: {id} - {} -> {next}", record.state);
        record.state = next;
        record.finished_at = Some(Utc::now());
        record.expiry_anchor = Some(Instant::now());
        record.result = Some(result);
        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| !self.is_expired(record, now));
        before.saturating_sub(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use geoflip_core_common::Format;

    use super::*;
    use crate::adapters::EncodedOutput;
    use crate::error::{ErrorKind, GeoflipError};
    use crate::request::{InputSource, InputSpec, JobSpec, OutputSpec};

    fn spec() -> JobSpec {
        JobSpec {
            input: InputSpec {
                format: Format::GeoJson,
                epsg: None,
                geometry_column: None,
                source: InputSource::File(PathBuf::from("in.geojson")),
            },
            transformations: Vec::new(),
            output: OutputSpec::new(Format::GeoJson, 4326),
        }
    }

    fn success() -> JobResult {
        JobResult::Success {
            output: EncodedOutput::File(PathBuf::from("out.geojson")),
            processing_time_seconds: 0.1,
            transformations_applied: Vec::new(),
        }
    }

    async fn started(store: &InMemoryJobStore) -> JobId {
        let id = JobId::new();
        store.insert(JobRecord::queued(id, spec())).await.unwrap();
        store.transition(&id, JobState::Started).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_result_is_written_once() {
        let store = InMemoryJobStore::new(Duration::from_secs(60));
        let id = started(&store).await;
        store.complete(&id, success()).await.unwrap();

        let failure = JobResult::Failure {
            kind: ErrorKind::Processing,
            message: "late".into(),
            processing_time_seconds: 1.0,
        };
        let err = store.complete(&id, failure).await.unwrap_err();
        assert!(matches!(err, GeoflipError::Job(JobError::InvalidTransition { .. })));

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.state, JobState::Success);
        assert_eq!(record.result, Some(success()));
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_state_only_via_complete() {
        let store = InMemoryJobStore::new(Duration::from_secs(60));
        let id = started(&store).await;
        assert!(store.transition(&id, JobState::Success).await.is_err());
        assert!(store.transition(&id, JobState::Queued).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = InMemoryJobStore::new(Duration::from_secs(60));
        let err = store.get(&JobId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_counts_from_completion() {
        let store = InMemoryJobStore::new(Duration::from_secs(60));
        let id = started(&store).await;

        tokio::time::advance(Duration::from_secs(45)).await;
        store.complete(&id, success()).await.unwrap();

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(store.get(&id).await.is_ok());

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.get(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_job_outlives_expiry() {
        let store = InMemoryJobStore::new(Duration::from_secs(60));
        let id = started(&store).await;
        store
            .transition(&id, JobState::Processing { phase: "Applying transformations".into() })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(store.purge_expired().await, 0);
        assert!(matches!(store.get(&id).await.unwrap().state, JobState::Processing { .. }));

        store.complete(&id, success()).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.get(&id).await.unwrap().state, JobState::Success);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.get(&id).await.unwrap_err().kind(), ErrorKind::NotFound);
    }
}
