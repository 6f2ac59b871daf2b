//! Submission, execution and querying of jobs.
//!
//! A [`JobOrchestrator`] owns the job queue, a pool of worker tasks and the
//! cleanup timers. Each job runs the blocking read, transform and write
//! pipeline on the blocking thread pool; status and result queries only read
//! the [`JobStore`] and never wait on a running job.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::adapters::{self, EncodedOutput};
use crate::context::PipelineContext;
use crate::error::{IoError, JobError, RequestError, Result};
use crate::jobs::cleanup::{cleanup_job, schedule_cleanup};
use crate::jobs::model::{JobId, JobOutput, JobRecord, JobResult, JobStatus, QueueStats, SubmitReceipt, Upload};
use crate::jobs::state::JobState;
use crate::jobs::store::{InMemoryJobStore, JobStore};
use crate::request::{JobSpec, TransformRequest};
use crate::transform::apply_transformations;
use crate::utils::sanitize_file_name;

pub const PHASE_READING: &str = "Reading input";
pub const PHASE_TRANSFORMING: &str = "Applying transformations";
pub const PHASE_WRITING: &str = "Writing output";

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
}

type Queue = Arc<Mutex<mpsc::UnboundedReceiver<JobId>>>;

/// Front door of the job pipeline.
#[derive(Debug)]
pub struct JobOrchestrator {
    ctx: PipelineContext,
    store: Arc<dyn JobStore>,
    sender: mpsc::UnboundedSender<JobId>,
    workers: Vec<JoinHandle<()>>,
    cleanup: TaskTracker,
    shutdown: CancellationToken,
    counters: Arc<Counters>,
}

impl JobOrchestrator {
    /// Start an orchestrator with an in-memory store.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(ctx: PipelineContext) -> Self {
        let store = Arc::new(InMemoryJobStore::new(ctx.config.job_expiry));
        Self::start_with_store(ctx, store)
    }

    /// Start an orchestrator on a caller-supplied store.
    #[must_use]
    pub fn start_with_store(ctx: PipelineContext, store: Arc<dyn JobStore>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue: Queue = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..ctx.config.workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    ctx.clone(),
                    Arc::clone(&store),
                    Arc::clone(&queue),
                    Arc::clone(&counters),
                ))
            })
            .collect::<Vec<_>>();
        log::info!(
            "Job orchestrator started with {} workers, data path {}",
            workers.len(),
            ctx.config.data_path.display()
        );

        Self {
            ctx,
            store,
            sender,
            workers,
            cleanup: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            counters,
        }
    }

    #[must_use]
    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Validate and enqueue a job.
    ///
    /// At most one upload is accepted; it is stored under the job's input
    /// directory with a sanitized name. Cleanup of the job directory is
    /// scheduled for `job_expiry` from now.
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any job exists. Fails with
    /// `QueueClosed` after [`JobOrchestrator::shutdown`].
    pub async fn submit(&self, request: TransformRequest, uploads: Vec<Upload>) -> Result<SubmitReceipt> {
        if uploads.len() > 1 {
            return Err(RequestError::ConflictingInput(format!(
                "expected at most one input file, got {}",
                uploads.len()
            ))
            .into());
        }

        let config = &self.ctx.config;
        let job_id = JobId::new();
        let input_dir = config.input_dir(&job_id);
        let upload = uploads.into_iter().next();
        let upload_path = upload
            .as_ref()
            .map(|upload| input_dir.join(sanitize_file_name(&upload.file_name)));
        let spec = request.into_job_spec(upload_path.clone())?;

        let format = spec.input.format.to_string();
        tokio::fs::create_dir_all(&input_dir)
            .await
            .map_err(|source| IoError::Write {
                format: format.clone(),
                path: input_dir.clone(),
                source: Box::new(source),
            })?;
        if let (Some(upload), Some(path)) = (upload, upload_path) {
            tokio::fs::write(&path, &upload.data)
                .await
                .map_err(|source| IoError::Write {
                    format,
                    path: path.clone(),
                    source: Box::new(source),
                })?;
            log::debug!("job_id: {job_id} - stored upload at {}", path.display());
        }

        self.store.insert(JobRecord::queued(job_id, spec)).await?;
        if self.sender.send(job_id).is_err() {
            let data_path = config.data_path().to_path_buf();
            blocking(move || {
                cleanup_job(&data_path, &job_id);
                Ok(())
            })
            .await?;
            return Err(JobError::QueueClosed.into());
        }
        schedule_cleanup(
            &self.cleanup,
            self.shutdown.clone(),
            Arc::clone(&self.store),
            config.data_path(),
            job_id,
            config.job_expiry,
        );

        log::info!("job_id: {job_id} - queued");
        Ok(SubmitReceipt::queued(job_id))
    }

    /// Current state of a job.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or expired jobs.
    pub async fn status(&self, job_id: &JobId) -> Result<JobStatus> {
        let record = self.store.get(job_id).await?;
        Ok(self.status_of(&record))
    }

    fn status_of(&self, record: &JobRecord) -> JobStatus {
        let result_reference = (record.state == JobState::Success).then(|| {
            format!(
                "{}/result/output/{}",
                self.ctx.config.result_base_url.as_deref().unwrap_or_default(),
                record.id
            )
        });
        JobStatus {
            job_id: record.id,
            status: record.state.as_label(),
            phase: record.state.phase().map(str::to_string),
            result_reference,
            error: record.result.as_ref().and_then(JobResult::failure_detail),
        }
    }

    /// Fetch the result of a successful job.
    ///
    /// # Errors
    ///
    /// `NotReady` unless the job succeeded (failed jobs included), `NotFound`
    /// for unknown jobs and for file results whose artifact is gone.
    pub async fn result(&self, job_id: &JobId) -> Result<JobOutput> {
        let record = self.store.get(job_id).await?;
        match record.result {
            Some(JobResult::Success {
                output: EncodedOutput::Inline(value),
                ..
            }) => Ok(JobOutput::Inline(value)),
            Some(JobResult::Success {
                output: EncodedOutput::File(path),
                ..
            }) => read_output(job_id, path).await,
            Some(failure @ JobResult::Failure { .. }) => Err(JobError::NotReady {
                job_id: job_id.to_string(),
                state: JobState::Failure.to_string(),
                detail: failure.failure_detail(),
            }
            .into()),
            None => Err(JobError::NotReady {
                job_id: job_id.to_string(),
                state: record.state.to_string(),
                detail: None,
            }
            .into()),
        }
    }

    /// Poll until the job is terminal and return its final status.
    ///
    /// # Errors
    ///
    /// `NotFound` if the job is unknown or expires while waiting.
    pub async fn wait_for_terminal(&self, job_id: &JobId, poll_interval: Duration) -> Result<JobStatus> {
        loop {
            let record = self.store.get(job_id).await?;
            if record.state.is_terminal() {
                return Ok(self.status_of(&record));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs, let queued jobs finish and drop pending cleanup timers.
    pub async fn shutdown(self) {
        let Self {
            sender,
            workers,
            cleanup,
            shutdown,
            counters,
            ..
        } = self;
        drop(sender);
        for worker in workers {
            if let Err(err) = worker.await {
                log::error!("Worker task ended abnormally: {err}");
            }
        }
        shutdown.cancel();
        cleanup.close();
        cleanup.wait().await;
        log::info!(
            "Job orchestrator stopped ({} completed, {} failed)",
            counters.completed.load(Ordering::Relaxed),
            counters.failed.load(Ordering::Relaxed)
        );
    }
}

async fn read_output(job_id: &JobId, path: PathBuf) -> Result<JobOutput> {
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(JobOutput::File {
                path,
                file_name,
                bytes: bytes.into(),
            })
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("job_id: {job_id} - output {} is gone", path.display());
            Err(JobError::ResultMissing {
                job_id: job_id.to_string(),
                path,
            }
            .into())
        },
        Err(source) => Err(IoError::Read {
            format: "output".to_string(),
            path,
            source: Box::new(source),
        }
        .into()),
    }
}

async fn worker_loop(
    worker: usize,
    ctx: PipelineContext,
    store: Arc<dyn JobStore>,
    queue: Queue,
    counters: Arc<Counters>,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(job_id) = next else {
            break;
        };
        if let Err(err) = run_counted(&ctx, store.as_ref(), job_id, Some(&counters)).await {
            log::error!("worker {worker}: job_id: {job_id} - failed: {err}");
        }
    }
    log::debug!("worker {worker}: queue closed, exiting");
}

/// Run one queued job to completion and record its result.
///
/// Refuses jobs that are not `queued`, so a job id executes at most once.
/// Pipeline errors are recorded as a failure result and then returned.
///
/// # Errors
///
/// The pipeline error that failed the job, or a store error.
pub async fn run_job(ctx: &PipelineContext, store: &dyn JobStore, job_id: JobId) -> Result<()> {
    run_counted(ctx, store, job_id, None).await
}

/// Counters move before the terminal result is stored, so a caller that sees
/// the terminal state also sees the updated counts.
async fn run_counted(
    ctx: &PipelineContext,
    store: &dyn JobStore,
    job_id: JobId,
    counters: Option<&Counters>,
) -> Result<()> {
    let record = store.get(&job_id).await?;
    if record.state != JobState::Queued {
        return Err(JobError::InvalidTransition {
            job_id: job_id.to_string(),
            from: record.state.to_string(),
            to: JobState::Started.to_string(),
        }
        .into());
    }
    store.transition(&job_id, JobState::Started).await?;

    let started = Instant::now();
    match execute(ctx, store, &job_id, Arc::clone(&record.spec)).await {
        Ok((output, applied)) => {
            let elapsed = started.elapsed().as_secs_f64();
            log::info!(
                "job_id: {job_id} - succeeded in {elapsed:.3}s with {} output",
                output.kind().as_str()
            );
            if let Some(counters) = counters {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            store
                .complete(
                    &job_id,
                    JobResult::Success {
                        output,
                        processing_time_seconds: elapsed,
                        transformations_applied: applied.into_iter().map(str::to_string).collect(),
                    },
                )
                .await
        },
        Err(err) => {
            let failure = JobResult::Failure {
                kind: err.kind(),
                message: err.to_string(),
                processing_time_seconds: started.elapsed().as_secs_f64(),
            };
            if let Some(counters) = counters {
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            if let Err(store_err) = store.complete(&job_id, failure).await {
                log::error!("job_id: {job_id} - could not record failure: {store_err}");
            }
            Err(err)
        },
    }
}

async fn execute(
    ctx: &PipelineContext,
    store: &dyn JobStore,
    job_id: &JobId,
    spec: Arc<JobSpec>,
) -> Result<(EncodedOutput, Vec<&'static str>)> {
    enter_phase(store, job_id, PHASE_READING).await?;
    let input = Arc::clone(&spec);
    let work_dir = ctx.config.input_dir(job_id);
    let table = blocking(move || adapters::decode(&input.input, Some(work_dir.as_path()))).await?;

    enter_phase(store, job_id, PHASE_TRANSFORMING).await?;
    let stages = Arc::clone(&spec);
    let reprojector = Arc::clone(&ctx.reprojector);
    let (table, applied) =
        blocking(move || apply_transformations(table, &stages.transformations, reprojector.as_ref())).await?;

    enter_phase(store, job_id, PHASE_WRITING).await?;
    let output_dir = ctx.config.output_dir(job_id);
    let reprojector = Arc::clone(&ctx.reprojector);
    let output = blocking(move || adapters::encode(table, &spec.output, &output_dir, reprojector.as_ref())).await?;
    Ok((output, applied))
}

async fn enter_phase(store: &dyn JobStore, job_id: &JobId, phase: &str) -> Result<()> {
    store
        .transition(
            job_id,
            JobState::Processing {
                phase: phase.to_string(),
            },
        )
        .await
}

async fn blocking<T, F>(stage: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(stage)
        .await
        .map_err(|err| anyhow::anyhow!("pipeline task failed: {err}"))?
}
