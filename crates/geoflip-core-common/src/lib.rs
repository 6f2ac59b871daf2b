//! Common types and traits shared across `Geoflip` crates.
//!
//! This crate provides the core abstractions that are shared between
//! `geoflip-core` and the format codec crates, preventing circular dependencies:
//! the canonical [`FeatureTable`], the attribute value model, the format and
//! driver descriptors, and the reader/writer traits every codec implements.

pub mod drivers;
pub mod io;
pub mod table;
pub mod value;

// Re-export commonly used types
pub use drivers::{Driver, DriverCapabilities, Format, SupportStatus};
pub use io::{FeatureReader, FeatureWriter};
pub use table::{
    Column, Feature, FeatureTable, Schema, TableBuilder, TableError, WGS84, coordinate_extent,
    geometry_type_name,
};
pub use value::{AttributeValue, ColumnType, duration_seconds, parse_timestamp};
