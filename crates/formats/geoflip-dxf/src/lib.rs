//! AutoCAD DXF codec for Geoflip.
//!
//! Drawings carry no spatial reference, so decoding needs an explicit EPSG
//! code. Entities become rows with their layer name as the only attribute;
//! on output every row is drawn as plain entities on its layer.

pub mod reader;
pub mod writer;

/// Attribute column holding an entity's layer name.
pub const LAYER_COLUMN: &str = "layer";
/// Layer used when a row names none.
pub const DEFAULT_LAYER: &str = "0";

pub use reader::{DxfReader, read_drawing};
pub use writer::{DxfWriter, build_drawing};
