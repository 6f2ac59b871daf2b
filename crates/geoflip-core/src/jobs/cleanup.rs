//! Expiry of job artifacts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::jobs::model::JobId;
use crate::jobs::store::JobStore;

/// Remove the artifact directory of a job.
///
/// Safe to run more than once: a missing directory is logged and skipped.
pub fn cleanup_job(data_path: &Path, job_id: &JobId) {
    let job_dir = data_path.join(job_id.to_string());
    if !job_dir.exists() {
        log::warn!("job_id: {job_id} - nothing to clean up at {}", job_dir.display());
        return;
    }
    if !job_dir.is_dir() {
        log::warn!("job_id: {job_id} - {} is not a directory, leaving it", job_dir.display());
        return;
    }
    match std::fs::remove_dir_all(&job_dir) {
        Ok(()) => log::info!("job_id: {job_id} - removed {}", job_dir.display()),
        Err(err) => log::error!("job_id: {job_id} - failed to remove {}: {err}", job_dir.display()),
    }
}

/// Schedule removal of a job's artifacts once `delay` has elapsed.
///
/// The task is tracked by `tracker` and stops early when `shutdown` is
/// cancelled, leaving the artifacts in place.
pub fn schedule_cleanup(
    tracker: &TaskTracker,
    shutdown: CancellationToken,
    store: Arc<dyn JobStore>,
    data_path: &Path,
    job_id: JobId,
    delay: Duration,
) {
    let data_path = data_path.to_path_buf();
    tracker.spawn(async move {
        tokio::select! {
            () = shutdown.cancelled() => {
                log::debug!("job_id: {job_id} - cleanup cancelled by shutdown");
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }

        let dir = data_path.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || cleanup_job(&dir, &job_id)).await {
            log::error!("job_id: {job_id} - cleanup task failed: {err}");
        }
        let purged = store.purge_expired().await;
        if purged > 0 {
            log::debug!("Purged {purged} expired job records");
        }
    });
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::jobs::store::InMemoryJobStore;

    #[test]
    fn test_cleanup_is_idempotent() {
        let root = TempDir::new().unwrap();
        let id = JobId::new();
        let output = root.path().join(id.to_string()).join("output");
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join("geoflip_csv_4326.csv"), "a\n").unwrap();

        cleanup_job(root.path(), &id);
        assert!(!root.path().join(id.to_string()).exists());
        cleanup_job(root.path(), &id);
    }

    #[test]
    fn test_cleanup_leaves_plain_files() {
        let root = TempDir::new().unwrap();
        let id = JobId::new();
        let path = root.path().join(id.to_string());
        std::fs::write(&path, "not a dir").unwrap();
        cleanup_job(root.path(), &id);
        assert!(path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_cleanup_runs_after_delay() {
        let root = TempDir::new().unwrap();
        let id = JobId::new();
        let job_dir = root.path().join(id.to_string());
        std::fs::create_dir_all(&job_dir).unwrap();

        let tracker = TaskTracker::new();
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new(Duration::from_secs(10)));
        schedule_cleanup(
            &tracker,
            CancellationToken::new(),
            store,
            root.path(),
            id,
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(job_dir.exists());

        tracker.close();
        tracker.wait().await;
        assert!(!job_dir.exists());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_cleanup() {
        let root = TempDir::new().unwrap();
        let id = JobId::new();
        let job_dir = root.path().join(id.to_string());
        std::fs::create_dir_all(&job_dir).unwrap();

        let tracker = TaskTracker::new();
        let token = CancellationToken::new();
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new(Duration::from_secs(3600)));
        schedule_cleanup(&tracker, token.clone(), store, root.path(), id, Duration::from_secs(3600));

        token.cancel();
        tracker.close();
        tracker.wait().await;
        assert!(job_dir.exists());
    }
}
