//! Data types describing a decoded dataset.
//!
//! These are produced by [`crate::operations::describe`] and rendered by the
//! CLI `info` command.

use geo_types::Rect;

/// Information about a dataset.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Path to the dataset
    pub dataset: String,
    /// Driver name
    pub driver: String,
    /// Driver long name
    pub driver_long_name: String,
    /// EPSG code of the decoded table
    pub srid: Option<u32>,
    /// Number of rows
    pub feature_count: usize,
    /// Distinct geometry type names, in first-seen order
    pub geometry_types: Vec<String>,
    /// Number of rows without a geometry
    pub null_geometries: usize,
    /// Bounding box of all geometries
    pub extent: Option<Rect<f64>>,
    /// Attribute fields
    pub fields: Vec<FieldInfo>,
}

/// Information about an attribute column.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Inferred column type
    pub data_type: String,
    /// Number of null values in the column
    pub null_count: usize,
}
