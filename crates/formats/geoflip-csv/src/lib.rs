//! CSV codec for Geoflip.
//!
//! Rows carry their geometry as Well-Known Text in a dedicated column
//! (`geom_wkt` by default). CSV does not describe its spatial reference, so
//! decoding always needs an explicit EPSG code.

pub mod geospatial;
pub mod writer;

pub use geospatial::{CsvReader, CsvReaderOptions, DEFAULT_GEOMETRY_COLUMN, read_csv};
pub use writer::{CsvWriter, CsvWriterOptions, to_record_batch, write_csv, write_csv_to_bytes};
