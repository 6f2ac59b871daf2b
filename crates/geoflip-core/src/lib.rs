//! `geoflip-core` is the job pipeline of the `Geoflip` project: it decodes a
//! geospatial dataset, applies an ordered list of transformations, reprojects
//! the result and encodes it, asynchronously and addressed by a job id.
//!
//! This crate includes:
//! - **Driver Registry**: the formats the pipeline reads and writes.
//! - **Requests**: the submitted JSON and its validated [`request::JobSpec`].
//! - **Adapters**: decode/encode between format codecs and the canonical feature table.
//! - **Transformations**: buffer and union with attribute aggregation.
//! - **Jobs**: submission, worker pool, status and result queries, artifact cleanup.
//!
//! Everything a worker needs is carried by an explicitly built
//! [`context::PipelineContext`].

pub mod adapters;
pub mod config;
pub mod context;
pub mod drivers;
pub mod error;
pub mod jobs;
pub mod operations;
pub mod reproject;
pub mod request;
pub mod transform;
pub mod types;
pub mod utils;

pub use config::GeoflipConfig;
pub use context::PipelineContext;
pub use error::{ErrorKind, GeoflipError, Result};
pub use jobs::{JobId, JobOrchestrator, JobOutput, JobState, JobStatus, SubmitReceipt, Upload};
pub use request::TransformRequest;
