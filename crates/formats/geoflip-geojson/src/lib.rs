//! `GeoJSON` codec for Geoflip.
//!
//! Input must be a `FeatureCollection`, either an uploaded file or inline
//! structured data. Output is always a WGS 84 `FeatureCollection`, written to a
//! file or returned as a JSON value.

pub mod parser;
pub mod writer;

pub use parser::{GeoJsonReader, parse_geojson_bytes, read_value};
pub use writer::{
    GeoJsonWriter, GeoJsonWriterOptions, to_feature_collection, write_geojson, write_value,
};
