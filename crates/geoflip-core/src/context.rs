//! Explicitly constructed dependencies of the job pipeline.

use std::sync::Arc;

use crate::config::GeoflipConfig;
use crate::reproject::{ProjReprojector, Reprojector};

/// Everything a worker needs to run a job, built once per process.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: Arc<GeoflipConfig>,
    pub reprojector: Arc<dyn Reprojector>,
}

impl PipelineContext {
    /// Context using PROJ for reprojection.
    #[must_use]
    pub fn new(config: GeoflipConfig) -> Self {
        Self::with_reprojector(config, Arc::new(ProjReprojector))
    }

    /// Context with a caller-supplied reprojector.
    #[must_use]
    pub fn with_reprojector(config: GeoflipConfig, reprojector: Arc<dyn Reprojector>) -> Self {
        Self {
            config: Arc::new(config),
            reprojector,
        }
    }
}
