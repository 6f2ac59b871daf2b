//! Decoding zipped (or bare) ESRI Shapefiles into a feature table.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use geo_types::Geometry;
use geoflip_core_common::{AttributeValue, FeatureReader, FeatureTable, Format, TableBuilder};
use geoflip_format_shared::{SourcePosition, SpatialFormatReadError, SpatialFormatResult};
use shapefile::dbase::{self, FieldValue};
use shapefile::Shape;

use crate::archive::{extract_archive, find_primary_file, has_extension};
use crate::prj::epsg_from_prj;

const DELETION_FLAG: &str = "DeletionFlag";

/// Options for Shapefile reading
#[derive(Debug, Clone, Default)]
pub struct ShapefileReaderOptions {
    /// Directory archives are extracted into. A temporary directory is used when unset.
    pub extract_dir: Option<PathBuf>,
}

impl ShapefileReaderOptions {
    /// Create new reader options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract archives into `dir` instead of a temporary directory
    #[must_use]
    pub fn with_extract_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extract_dir = Some(dir.into());
        self
    }
}

/// Reads Shapefiles from a zip bundle or from a bare `.shp` path.
///
/// The spatial reference comes from the caller when given, otherwise from the
/// `.prj` sidecar.
#[derive(Debug, Clone, Default)]
pub struct ShapefileReader {
    options: ShapefileReaderOptions,
}

impl ShapefileReader {
    #[must_use]
    pub fn new(options: ShapefileReaderOptions) -> Self {
        Self { options }
    }
}

impl FeatureReader for ShapefileReader {
    type Error = SpatialFormatReadError;

    fn format(&self) -> Format {
        Format::Shapefile
    }

    fn read_path(&self, path: &Path, srid: Option<u32>) -> SpatialFormatResult<FeatureTable> {
        if has_extension(path, "shp") {
            return read_shp(path, srid);
        }

        let context = path.display().to_string();
        let (extract_root, _guard) = match &self.options.extract_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (dir.clone(), None)
            },
            None => {
                let temp = tempfile::TempDir::new()?;
                (temp.path().to_path_buf(), Some(temp))
            },
        };

        let listing = extract_archive(path, &extract_root)?;
        let primary = find_primary_file(&listing)
            .map_err(|err| SpatialFormatReadError::parse(err.to_string(), context.clone()))?;
        read_shp(&extract_root.join(primary), srid)
    }
}

/// Read a `.shp` with its `.shx`/`.dbf` sidecars.
///
/// # Errors
///
/// Returns an error if a required sidecar is missing, the spatial reference
/// cannot be resolved, or the shapes or records cannot be decoded.
pub fn read_shp(shp_path: &Path, srid: Option<u32>) -> SpatialFormatResult<FeatureTable> {
    let context = shp_path.display().to_string();
    let dbf_path = canonical_sidecar(shp_path, "dbf")?
        .ok_or_else(|| SpatialFormatReadError::parse("missing .dbf sidecar", context.clone()))?;
    canonical_sidecar(shp_path, "shx")?
        .ok_or_else(|| SpatialFormatReadError::parse("missing .shx sidecar", context.clone()))?;

    let srid = match srid {
        Some(code) => code,
        None => srid_from_prj(shp_path)?.ok_or_else(|| {
            SpatialFormatReadError::MissingSpatialReference {
                format: Format::Shapefile.to_string(),
            }
        })?,
    };

    let field_names = read_field_names(&dbf_path)?;
    let mut reader = shapefile::Reader::from_path(shp_path)
        .map_err(|err| SpatialFormatReadError::parse(err.to_string(), context.clone()))?;

    let mut builder = TableBuilder::new().with_columns(field_names.iter().cloned());
    for (row, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item.map_err(|err| record_error(&err, row, &context))?;
        let geometry = shape_to_geometry(shape).map_err(|message| SpatialFormatReadError::Parse {
            message,
            position: Some(record_position(row)),
            context: Some(context.clone()),
        })?;
        builder.push_row(
            geometry,
            field_names.iter().map(|name| {
                let value = record
                    .get(name)
                    .map_or(AttributeValue::Null, field_to_attribute);
                (name.clone(), value)
            }),
        );
    }

    log::debug!("Read {} shapes from {context} (EPSG:{srid})", builder.len());
    Ok(builder.finish(Some(srid)))
}

/// Locate `<stem>.<extension>` next to the `.shp` in any letter case and make
/// it reachable under the lowercase name the shapefile reader opens.
fn canonical_sidecar(shp_path: &Path, extension: &str) -> SpatialFormatResult<Option<PathBuf>> {
    let expected = shp_path.with_extension(extension);
    if expected.exists() {
        return Ok(Some(expected));
    }
    let Some(stem) = shp_path.file_stem() else {
        return Ok(None);
    };
    let dir = shp_path.parent().unwrap_or_else(|| Path::new("."));
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.file_stem() == Some(stem) && has_extension(&path, extension) {
            log::debug!("Renaming {} to {}", path.display(), expected.display());
            std::fs::rename(&path, &expected)?;
            return Ok(Some(expected));
        }
    }
    Ok(None)
}

fn srid_from_prj(shp_path: &Path) -> SpatialFormatResult<Option<u32>> {
    let Some(prj_path) = canonical_sidecar(shp_path, "prj")? else {
        log::warn!("{} has no .prj sidecar", shp_path.display());
        return Ok(None);
    };
    let text = std::fs::read_to_string(&prj_path)?;
    let code = epsg_from_prj(&text);
    if code.is_none() {
        log::warn!(
            "Could not resolve an EPSG code from {}",
            prj_path.display()
        );
    }
    Ok(code)
}

fn read_field_names(dbf_path: &Path) -> SpatialFormatResult<Vec<String>> {
    let reader = dbase::Reader::from_path(dbf_path).map_err(|err| {
        SpatialFormatReadError::parse(err.to_string(), dbf_path.display().to_string())
    })?;
    Ok(reader
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .filter(|name| *name != DELETION_FLAG)
        .collect())
}

fn record_position(row: usize) -> SourcePosition {
    SourcePosition {
        record: Some(row as u64 + 1),
        ..SourcePosition::default()
    }
}

fn record_error(err: &shapefile::Error, row: usize, context: &str) -> SpatialFormatReadError {
    SpatialFormatReadError::Parse {
        message: err.to_string(),
        position: Some(record_position(row)),
        context: Some(context.to_string()),
    }
}

/// Convert a shape; polygon and polyline shapes with a single part collapse
/// to their simple geometry.
fn shape_to_geometry(shape: Shape) -> Result<Option<Geometry<f64>>, String> {
    if matches!(shape, Shape::NullShape) {
        return Ok(None);
    }
    let geometry = Geometry::<f64>::try_from(shape)
        .map_err(|err| format!("Unsupported shape: {err:?}"))?;
    Ok(Some(match geometry {
        Geometry::MultiPolygon(mut mp) if mp.0.len() == 1 => Geometry::Polygon(mp.0.remove(0)),
        Geometry::MultiLineString(mut ml) if ml.0.len() == 1 => {
            Geometry::LineString(ml.0.remove(0))
        },
        other => other,
    }))
}

/// Numbers that are integral become integers; a column mixing both is inferred as float.
fn number_value(value: f64) -> AttributeValue {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        AttributeValue::Integer(value as i64)
    } else {
        AttributeValue::Float(value)
    }
}

fn date_value(date: &dbase::Date) -> AttributeValue {
    NaiveDate::from_ymd_opt(date.year() as i32, date.month(), date.day())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(AttributeValue::Null, |naive| {
            AttributeValue::Timestamp(naive.and_utc())
        })
}

fn field_to_attribute(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(text)) | FieldValue::Memo(text) => {
            AttributeValue::Text(text.clone())
        },
        FieldValue::Numeric(Some(v)) => number_value(*v),
        FieldValue::Float(Some(v)) => number_value(f64::from(*v)),
        FieldValue::Double(v) | FieldValue::Currency(v) => number_value(*v),
        FieldValue::Integer(v) => AttributeValue::Integer(i64::from(*v)),
        FieldValue::Logical(Some(v)) => AttributeValue::Boolean(*v),
        FieldValue::Date(Some(date)) => date_value(date),
        FieldValue::DateTime(dt) => {
            let date = dt.date();
            let time = dt.time();
            NaiveDate::from_ymd_opt(date.year() as i32, date.month(), date.day())
                .and_then(|d| d.and_hms_opt(time.hours(), time.minutes(), time.seconds()))
                .map_or(AttributeValue::Null, |naive| {
                    AttributeValue::Timestamp(naive.and_utc())
                })
        },
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None) => AttributeValue::Null,
        #[allow(unreachable_patterns)]
        other => AttributeValue::Text(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_fields() {
        assert_eq!(
            field_to_attribute(&FieldValue::Numeric(Some(12.0))),
            AttributeValue::Integer(12)
        );
        assert_eq!(
            field_to_attribute(&FieldValue::Numeric(Some(12.5))),
            AttributeValue::Float(12.5)
        );
        assert_eq!(
            field_to_attribute(&FieldValue::Numeric(None)),
            AttributeValue::Null
        );
        assert_eq!(
            field_to_attribute(&FieldValue::Integer(7)),
            AttributeValue::Integer(7)
        );
    }

    #[test]
    fn test_text_and_logical_fields() {
        assert_eq!(
            field_to_attribute(&FieldValue::Character(Some("Main St".into()))),
            AttributeValue::Text("Main St".into())
        );
        assert_eq!(
            field_to_attribute(&FieldValue::Logical(Some(true))),
            AttributeValue::Boolean(true)
        );
        assert_eq!(
            field_to_attribute(&FieldValue::Character(None)),
            AttributeValue::Null
        );
    }

    #[test]
    fn test_null_shape_has_no_geometry() {
        assert_eq!(shape_to_geometry(Shape::NullShape), Ok(None));
    }

    #[test]
    fn test_single_part_polygon_collapses() {
        let polygon = shapefile::Polygon::new(shapefile::PolygonRing::Outer(vec![
            shapefile::Point::new(0.0, 0.0),
            shapefile::Point::new(0.0, 1.0),
            shapefile::Point::new(1.0, 1.0),
            shapefile::Point::new(0.0, 0.0),
        ]));
        let geometry = shape_to_geometry(Shape::Polygon(polygon)).unwrap();
        assert!(matches!(geometry, Some(Geometry::Polygon(_))));
    }

    #[test]
    fn test_bare_shp_requires_sidecars() {
        let dir = tempfile::TempDir::new().unwrap();
        let shp = dir.path().join("lonely.shp");
        std::fs::write(&shp, b"").unwrap();
        let err = read_shp(&shp, Some(4326)).unwrap_err();
        assert!(err.to_string().contains("missing .dbf sidecar"));
    }
}
