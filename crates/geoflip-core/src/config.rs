//! Process-level configuration.
//!
//! A [`GeoflipConfig`] is built once at startup, either explicitly or from the
//! environment, and shared through the [`crate::context::PipelineContext`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::jobs::JobId;

/// Environment variable naming the artifact root directory.
pub const DATA_PATH_ENV: &str = "GEOFLIP_DATA_PATH";
/// Environment variable holding the job expiry in seconds.
pub const JOB_EXPIRY_ENV: &str = "GEOFLIP_JOB_EXPIRY_SECS";
/// Environment variable holding the worker count.
pub const WORKERS_ENV: &str = "GEOFLIP_WORKERS";
/// Environment variable holding the prefix of result references.
pub const RESULT_BASE_URL_ENV: &str = "GEOFLIP_RESULT_BASE_URL";

/// Default time a job's result and artifacts are kept.
pub const DEFAULT_JOB_EXPIRY: Duration = Duration::from_secs(3600);

/// Configuration shared by the orchestrator, workers and cleanup.
#[derive(Debug, Clone)]
pub struct GeoflipConfig {
    /// Root under which every job gets a `{job_id}/input` and `{job_id}/output` directory.
    pub data_path: PathBuf,
    /// Retention of results and artifacts, counted from job completion.
    pub job_expiry: Duration,
    /// Number of worker tasks.
    pub workers: usize,
    /// Prefix of `result_reference` values, e.g. `https://api.example.com`.
    pub result_base_url: Option<String>,
}

impl GeoflipConfig {
    /// Create a configuration rooted at `data_path` with default settings.
    #[must_use]
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            job_expiry: DEFAULT_JOB_EXPIRY,
            workers: default_workers(),
            result_base_url: None,
        }
    }

    /// Set the job expiry window.
    #[must_use]
    pub fn with_job_expiry(mut self, job_expiry: Duration) -> Self {
        self.job_expiry = job_expiry;
        self
    }

    /// Set the number of workers (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the prefix used for result references.
    #[must_use]
    pub fn with_result_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.result_base_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    /// Build the configuration from `GEOFLIP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `GEOFLIP_DATA_PATH` is unset
    /// and `ConfigError::InvalidOption` for unparsable numbers, a zero expiry
    /// or zero workers.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same conditions as [`GeoflipConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_path = get(DATA_PATH_ENV).ok_or_else(|| ConfigError::MissingRequired {
            option: DATA_PATH_ENV.to_string(),
        })?;
        let mut config = Self::new(data_path);

        if let Some(raw) = get(JOB_EXPIRY_ENV) {
            let secs: u64 = parse_number(JOB_EXPIRY_ENV, &raw)?;
            if secs == 0 {
                return Err(ConfigError::InvalidOption {
                    option: JOB_EXPIRY_ENV.to_string(),
                    message: "must be at least 1 second".to_string(),
                });
            }
            config = config.with_job_expiry(Duration::from_secs(secs));
        }
        if let Some(raw) = get(WORKERS_ENV) {
            let workers: usize = parse_number(WORKERS_ENV, &raw)?;
            if workers == 0 {
                return Err(ConfigError::InvalidOption {
                    option: WORKERS_ENV.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            config = config.with_workers(workers);
        }
        if let Some(url) = get(RESULT_BASE_URL_ENV) {
            config = config.with_result_base_url(url);
        }
        Ok(config)
    }

    /// Directory owned by one job.
    #[must_use]
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.data_path.join(job_id.to_string())
    }

    /// Directory holding a job's uploads.
    #[must_use]
    pub fn input_dir(&self, job_id: &JobId) -> PathBuf {
        self.job_dir(job_id).join("input")
    }

    /// Directory holding a job's generated artifacts.
    #[must_use]
    pub fn output_dir(&self, job_id: &JobId) -> PathBuf {
        self.job_dir(job_id).join("output")
    }

    /// The artifact root.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

fn parse_number<T: std::str::FromStr>(option: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidOption {
            option: option.to_string(),
            message: format!("'{raw}': {err}"),
        })
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
