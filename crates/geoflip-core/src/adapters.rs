//! Input and output adapters.
//!
//! [`decode`] turns an [`InputSpec`] into a [`FeatureTable`] by dispatching to
//! the format codec; [`encode`] reprojects a table to the requested reference
//! and hands it to the output codec.

use std::path::{Path, PathBuf};

use geoflip_core_common::{FeatureReader, FeatureTable, FeatureWriter, Format};
use geoflip_csv::{CsvReader, CsvReaderOptions, CsvWriter, CsvWriterOptions};
use geoflip_dxf::{DxfReader, DxfWriter};
use geoflip_format_shared::{SpatialFormatReadError, SpatialFormatWriteError};
use geoflip_geojson::{GeoJsonReader, GeoJsonWriter, GeoJsonWriterOptions};
use geoflip_shapefile::{ShapefileReader, ShapefileReaderOptions, ShapefileWriter};
use serde_json::Value;

use crate::error::{FormatError, IoError, Result, read_error, write_error};
use crate::reproject::Reprojector;
use crate::request::{InputSource, InputSpec, OutputSpec};
use crate::utils::output_base_name;

/// Kind of artifact an encode produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    FilePath,
    InlineData,
}

impl OutputKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            OutputKind::FilePath => "filepath",
            OutputKind::InlineData => "data",
        }
    }
}

/// Result of encoding a table.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedOutput {
    File(PathBuf),
    Inline(Value),
}

impl EncodedOutput {
    #[must_use]
    pub fn kind(&self) -> OutputKind {
        match self {
            EncodedOutput::File(_) => OutputKind::FilePath,
            EncodedOutput::Inline(_) => OutputKind::InlineData,
        }
    }
}

/// Decode the job input into a feature table.
///
/// Shapefile archives are extracted into `work_dir` when given.
///
/// # Errors
///
/// Returns `MissingSpatialReference` when the format needs an EPSG code and
/// none was given, `MalformedInput` when decoding fails, and a not-found error
/// when the uploaded file is gone.
pub fn decode(spec: &InputSpec, work_dir: Option<&Path>) -> Result<FeatureTable> {
    let format = spec.format;
    let table = match &spec.source {
        InputSource::Inline(value) => {
            if !format.supports_inline_input() {
                return Err(FormatError::Malformed {
                    format: format.to_string(),
                    message: "inline data is not accepted for this format".to_string(),
                }
                .into());
            }
            geoflip_geojson::read_value(value.clone()).map_err(|err| read_error(format.as_str(), None, err))?
        },
        InputSource::File(path) => {
            if !path.exists() {
                return Err(IoError::FileNotFound { path: path.clone() }.into());
            }
            read_file(spec, path, work_dir).map_err(|err| read_error(format.as_str(), Some(path), err))?
        },
    };
    log::info!(
        "Decoded {} rows of {format} input (EPSG:{})",
        table.len(),
        table.srid().map_or_else(|| "unknown".to_string(), |s| s.to_string())
    );
    Ok(table)
}

fn read_file(
    spec: &InputSpec,
    path: &Path,
    work_dir: Option<&Path>,
) -> std::result::Result<FeatureTable, SpatialFormatReadError> {
    match spec.format {
        Format::GeoJson => GeoJsonReader.read_path(path, spec.epsg),
        Format::Csv => {
            let mut options = CsvReaderOptions::new();
            if let Some(column) = &spec.geometry_column {
                options = options.with_geometry_column(column.clone());
            }
            CsvReader::new(options).read_path(path, spec.epsg)
        },
        Format::Shapefile => {
            let mut options = ShapefileReaderOptions::new();
            if let Some(dir) = work_dir {
                options = options.with_extract_dir(dir);
            }
            ShapefileReader::new(options).read_path(path, spec.epsg)
        },
        Format::Dxf => DxfReader.read_path(path, spec.epsg),
    }
}

/// Reproject `table` to the output reference and encode it.
///
/// File outputs are written into `output_dir` as
/// `geoflip_<format>_<epsg>.<ext>`. `GeoJSON` is always produced in WGS 84.
///
/// # Errors
///
/// Returns `MissingSpatialReference` when the table has no reference, and
/// reprojection or codec failures.
pub fn encode(
    table: FeatureTable,
    spec: &OutputSpec,
    output_dir: &Path,
    reprojector: &dyn Reprojector,
) -> Result<EncodedOutput> {
    let format = spec.format;
    if table.srid().is_none() {
        return Err(FormatError::MissingSpatialReference {
            format: format.to_string(),
        }
        .into());
    }

    let target = match format.fixed_srid() {
        Some(fixed) if fixed != spec.epsg => {
            log::warn!(
                "{format} output is always EPSG:{fixed}; ignoring requested EPSG:{}",
                spec.epsg
            );
            fixed
        },
        Some(fixed) => fixed,
        None => spec.epsg,
    };
    let table = reprojector.reproject(table, target)?;

    if !spec.to_file {
        if !format.supports_inline_output() {
            return Err(FormatError::Encode {
                format: format.to_string(),
                message: "only geojson can be returned inline".to_string(),
            }
            .into());
        }
        let value = geoflip_geojson::write_value(&table).map_err(|err| write_error(format.as_str(), output_dir, err))?;
        log::info!("Encoded {} rows as inline {format}", table.len());
        return Ok(EncodedOutput::Inline(value));
    }

    std::fs::create_dir_all(output_dir).map_err(|source| IoError::Write {
        format: format.to_string(),
        path: output_dir.to_path_buf(),
        source: Box::new(source),
    })?;
    let base_name = output_base_name(format, target);
    let path = write_file(&table, format, output_dir, &base_name)
        .map_err(|err| write_error(format.as_str(), output_dir, err))?;
    log::info!("Encoded {} rows to {}", table.len(), path.display());
    Ok(EncodedOutput::File(path))
}

fn write_file(
    table: &FeatureTable,
    format: Format,
    dir: &Path,
    base_name: &str,
) -> std::result::Result<PathBuf, SpatialFormatWriteError> {
    match format {
        Format::GeoJson => GeoJsonWriter::new(GeoJsonWriterOptions::new()).write_path(table, dir, base_name),
        Format::Csv => CsvWriter::new(CsvWriterOptions::new()).write_path(table, dir, base_name),
        Format::Shapefile => ShapefileWriter.write_path(table, dir, base_name),
        Format::Dxf => DxfWriter.write_path(table, dir, base_name),
    }
}

#[cfg(test)]
mod tests {
    use geo_types::point;
    use geoflip_core_common::{AttributeValue, TableBuilder};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;
    use crate::reproject::IdentityReprojector;

    fn points(srid: Option<u32>) -> FeatureTable {
        let mut builder = TableBuilder::new();
        builder.push_row(
            Some(point!(x: 115.86, y: -31.95).into()),
            [("name", AttributeValue::Text("Perth".into()))],
        );
        builder.finish(srid)
    }

    fn inline_spec(data: Value) -> InputSpec {
        InputSpec {
            format: Format::GeoJson,
            epsg: None,
            geometry_column: None,
            source: InputSource::Inline(data),
        }
    }

    #[test]
    fn test_decode_inline_feature_collection() {
        let table = decode(
            &inline_spec(json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "geometry": {"type": "Point", "coordinates": [115.86, -31.95]},
                    "properties": {"name": "Perth"}
                }]
            })),
            None,
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.srid(), Some(4326));
    }

    #[test]
    fn test_decode_rejects_bare_geometry() {
        let err = decode(&inline_spec(json!({"type": "Point", "coordinates": [0.0, 0.0]})), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_decode_missing_file() {
        let spec = InputSpec {
            format: Format::Csv,
            epsg: Some(28350),
            geometry_column: None,
            source: InputSource::File(PathBuf::from("/definitely/not/here.csv")),
        };
        let err = decode(&spec, None).unwrap_err();
        assert!(matches!(err, crate::error::GeoflipError::Io(IoError::FileNotFound { .. })));
    }

    #[test]
    fn test_decode_csv_without_epsg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("points.csv");
        std::fs::write(&path, "name,geom_wkt\nPerth,POINT (115.86 -31.95)\n").unwrap();
        let spec = InputSpec {
            format: Format::Csv,
            epsg: None,
            geometry_column: None,
            source: InputSource::File(path),
        };
        assert_eq!(decode(&spec, None).unwrap_err().kind(), ErrorKind::MissingSpatialReference);
    }

    #[test]
    fn test_encode_file_names() {
        let dir = TempDir::new().unwrap();
        let out = encode(
            points(Some(28350)),
            &OutputSpec::new(Format::Csv, 28350),
            dir.path(),
            &IdentityReprojector,
        )
        .unwrap();
        assert_eq!(out.kind(), OutputKind::FilePath);
        assert_eq!(out, EncodedOutput::File(dir.path().join("geoflip_csv_28350.csv")));
    }

    #[test]
    fn test_geojson_is_always_wgs84() {
        let dir = TempDir::new().unwrap();
        let out = encode(
            points(Some(3857)),
            &OutputSpec::new(Format::GeoJson, 3857),
            dir.path(),
            &IdentityReprojector,
        )
        .unwrap();
        assert_eq!(out, EncodedOutput::File(dir.path().join("geoflip_geojson_4326.geojson")));
    }

    #[test]
    fn test_inline_geojson() {
        let dir = TempDir::new().unwrap();
        let out = encode(
            points(Some(4326)),
            &OutputSpec::new(Format::GeoJson, 4326).inline(),
            dir.path(),
            &IdentityReprojector,
        )
        .unwrap();
        let EncodedOutput::Inline(value) = out else {
            panic!("expected inline output");
        };
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["properties"]["name"], "Perth");
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_encode_requires_srid() {
        let dir = TempDir::new().unwrap();
        let err = encode(points(None), &OutputSpec::new(Format::Dxf, 4326), dir.path(), &IdentityReprojector)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingSpatialReference);
    }
}
