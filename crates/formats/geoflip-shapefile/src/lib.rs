//! ESRI Shapefile codec for Geoflip.
//!
//! Shapefiles travel as a zip bundle holding the `.shp`, `.shx` and `.dbf`
//! parts plus an optional `.prj`. The spatial reference is taken from the
//! caller or, failing that, from the `.prj`.

pub mod archive;
pub mod prj;
pub mod reader;
pub mod writer;

pub use archive::{PrimaryFileError, bundle_files, extract_archive, find_primary_file};
pub use prj::{epsg_from_prj, prj_for_epsg};
pub use reader::{ShapefileReader, ShapefileReaderOptions, read_shp};
pub use writer::{
    MAX_FIELD_NAME_LEN, ShapeFamily, ShapefileWriter, dbf_field_names, table_family,
    write_shapefile,
};
