//! I/O traits for decoding and encoding feature tables.
//!
//! Every format codec crate implements these traits so the job pipeline can
//! dispatch on a [`Format`] without knowing codec internals.

use std::path::{Path, PathBuf};

use crate::drivers::Format;
use crate::table::FeatureTable;

/// Trait for decoding a file-based dataset into a [`FeatureTable`].
pub trait FeatureReader: Send + Sync {
    /// Error produced by the codec.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The format this reader decodes.
    fn format(&self) -> Format;

    /// Decodes the dataset at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - The uploaded artifact (a file or, for archives, the archive itself)
    /// * `srid` - The caller-supplied EPSG code; required by formats that do not
    ///   describe their spatial reference, an override for those that do
    fn read_path(&self, path: &Path, srid: Option<u32>) -> Result<FeatureTable, Self::Error>;
}

/// Trait for encoding a [`FeatureTable`] into a file artifact.
pub trait FeatureWriter: Send + Sync {
    /// Error produced by the codec.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The format this writer encodes.
    fn format(&self) -> Format;

    /// Encodes `table` into `dir`, naming the artifact after `base_name`.
    ///
    /// The table is written in its current spatial reference; reprojection
    /// happens before the writer is called.
    ///
    /// # Returns
    ///
    /// The path of the single artifact a client downloads.
    fn write_path(
        &self,
        table: &FeatureTable,
        dir: &Path,
        base_name: &str,
    ) -> Result<PathBuf, Self::Error>;
}
