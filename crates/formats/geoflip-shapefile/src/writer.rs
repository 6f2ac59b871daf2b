//! Encoding a feature table as a zipped ESRI Shapefile.

use std::collections::HashSet;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use geo_types::{Coord, Geometry, LineString, Polygon};
use geoflip_core_common::{
    AttributeValue, ColumnType, FeatureTable, FeatureWriter, Format, duration_seconds,
    geometry_type_name,
};
use geoflip_format_shared::{SpatialFormatWriteError, SpatialWriteResult};
use shapefile::dbase::{self, FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::record::EsriShape;
use shapefile::{Multipoint, Point, PolygonRing, Polyline};

use crate::archive::bundle_files;
use crate::prj::prj_for_epsg;

/// Longest dBASE field name.
pub const MAX_FIELD_NAME_LEN: usize = 10;
const MAX_CHARACTER_LEN: usize = 254;

/// Writes `<base_name>.zip` holding `.shp`, `.shx`, `.dbf` and, for known
/// codes, `.prj` members.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapefileWriter;

impl FeatureWriter for ShapefileWriter {
    type Error = SpatialFormatWriteError;

    fn format(&self) -> Format {
        Format::Shapefile
    }

    fn write_path(
        &self,
        table: &FeatureTable,
        dir: &Path,
        base_name: &str,
    ) -> SpatialWriteResult<PathBuf> {
        let staging = dir.join(format!(".{base_name}_parts"));
        std::fs::create_dir_all(&staging)?;

        let parts = write_shapefile(table, &staging, base_name)?;
        let zip_path = dir.join(format!("{base_name}.{}", Format::Shapefile.output_extension()));
        bundle_files(&zip_path, &parts)?;

        if let Err(err) = std::fs::remove_dir_all(&staging) {
            log::warn!("Could not remove staging directory {}: {err}", staging.display());
        }
        Ok(zip_path)
    }
}

/// Which single shape type a table is written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeFamily {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

fn family_of(geometry: &Geometry<f64>) -> SpatialWriteResult<ShapeFamily> {
    match geometry {
        Geometry::Point(_) => Ok(ShapeFamily::Point),
        Geometry::MultiPoint(_) => Ok(ShapeFamily::Multipoint),
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
            Ok(ShapeFamily::Polyline)
        },
        Geometry::Polygon(_)
        | Geometry::MultiPolygon(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => Ok(ShapeFamily::Polygon),
        Geometry::GeometryCollection(_) => Err(SpatialFormatWriteError::UnsupportedGeometry {
            geometry_type: geometry_type_name(geometry).to_string(),
            format: "Shapefile".to_string(),
        }),
    }
}

/// The shape family shared by every geometry of `table`.
///
/// Points and multipoints combine into multipoints; any other mix is an error.
///
/// # Errors
///
/// Returns an encode error for mixed families and an unsupported-geometry error
/// for geometry collections.
pub fn table_family(table: &FeatureTable) -> SpatialWriteResult<Option<ShapeFamily>> {
    let mut family = None;
    for geometry in table.geometries().flatten() {
        let next = family_of(geometry)?;
        family = Some(match (family, next) {
            (None, next) => next,
            (Some(current), next) if current == next => current,
            (
                Some(ShapeFamily::Point | ShapeFamily::Multipoint),
                ShapeFamily::Point | ShapeFamily::Multipoint,
            ) => ShapeFamily::Multipoint,
            (Some(current), next) => {
                return Err(SpatialFormatWriteError::encode(format!(
                    "a Shapefile holds one shape type; found {current:?} and {next:?} geometries"
                )));
            },
        });
    }
    Ok(family)
}

/// Truncate column names to the dBASE limit, de-duplicating collisions with a
/// numeric suffix.
#[must_use]
pub fn dbf_field_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let mut candidate = truncate_bytes(name, MAX_FIELD_NAME_LEN).to_string();
        let mut suffix = 1;
        while !taken.insert(candidate.to_ascii_lowercase()) {
            let tail = format!("_{suffix}");
            candidate = format!(
                "{}{tail}",
                truncate_bytes(name, MAX_FIELD_NAME_LEN - tail.len())
            );
            suffix += 1;
        }
        out.push(candidate);
    }
    out
}

fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

enum FieldKind {
    Character,
    Numeric,
    Logical,
}

struct FieldSpec {
    name: String,
    kind: FieldKind,
}

fn table_fields(table: &FeatureTable) -> SpatialWriteResult<(TableWriterBuilder, Vec<FieldSpec>)> {
    let names = dbf_field_names(table.schema().names());
    let mut builder = TableWriterBuilder::new();
    let mut specs = Vec::with_capacity(names.len());

    for (idx, (column, name)) in table.schema().columns().iter().zip(names).enumerate() {
        if name != column.name {
            log::warn!("Shapefile field '{}' written as '{name}'", column.name);
        }
        let field_name = FieldName::try_from(name.as_str()).map_err(|err| {
            SpatialFormatWriteError::encode(format!("invalid dBASE field name '{name}': {err:?}"))
        })?;
        let kind = match column.column_type {
            ColumnType::Integer => {
                builder = builder.add_numeric_field(field_name, 18, 0);
                FieldKind::Numeric
            },
            ColumnType::Float => {
                builder = builder.add_numeric_field(field_name, 24, 8);
                FieldKind::Numeric
            },
            ColumnType::Duration => {
                builder = builder.add_numeric_field(field_name, 18, 3);
                FieldKind::Numeric
            },
            ColumnType::Boolean => {
                builder = builder.add_logical_field(field_name);
                FieldKind::Logical
            },
            ColumnType::Text | ColumnType::Timestamp => {
                let width = table
                    .features()
                    .iter()
                    .map(|f| f.attributes[idx].to_string().len())
                    .max()
                    .unwrap_or(1)
                    .clamp(1, MAX_CHARACTER_LEN);
                builder = builder.add_character_field(field_name, width as u8);
                FieldKind::Character
            },
        };
        specs.push(FieldSpec { name, kind });
    }
    Ok((builder, specs))
}

fn field_value(kind: &FieldKind, value: &AttributeValue) -> FieldValue {
    match (kind, value) {
        (FieldKind::Numeric, AttributeValue::Integer(v)) => FieldValue::Numeric(Some(*v as f64)),
        (FieldKind::Numeric, AttributeValue::Float(v)) => FieldValue::Numeric(Some(*v)),
        (FieldKind::Numeric, AttributeValue::Duration(d)) => {
            FieldValue::Numeric(Some(duration_seconds(d)))
        },
        (FieldKind::Numeric, _) => FieldValue::Numeric(None),
        (FieldKind::Logical, AttributeValue::Boolean(v)) => FieldValue::Logical(Some(*v)),
        (FieldKind::Logical, _) => FieldValue::Logical(None),
        (FieldKind::Character, AttributeValue::Null) => FieldValue::Character(None),
        (FieldKind::Character, other) => FieldValue::Character(Some(
            truncate_bytes(&other.to_string(), MAX_CHARACTER_LEN).to_string(),
        )),
    }
}

fn point(c: Coord<f64>) -> Point {
    Point::new(c.x, c.y)
}

fn points(line: &LineString<f64>) -> Vec<Point> {
    line.coords().copied().map(point).collect()
}

fn polygon_rings(polygon: &Polygon<f64>, rings: &mut Vec<PolygonRing<Point>>) {
    rings.push(PolygonRing::Outer(points(polygon.exterior())));
    for interior in polygon.interiors() {
        rings.push(PolygonRing::Inner(points(interior)));
    }
}

fn to_multipoint(geometry: &Geometry<f64>) -> Multipoint {
    let pts = match geometry {
        Geometry::Point(p) => vec![point(p.0)],
        Geometry::MultiPoint(mp) => mp.iter().map(|p| point(p.0)).collect(),
        _ => Vec::new(),
    };
    Multipoint::new(pts)
}

fn to_polyline(geometry: &Geometry<f64>) -> Polyline {
    let parts = match geometry {
        Geometry::Line(l) => vec![vec![point(l.start), point(l.end)]],
        Geometry::LineString(ls) => vec![points(ls)],
        Geometry::MultiLineString(mls) => mls.iter().map(points).collect(),
        _ => Vec::new(),
    };
    Polyline::with_parts(parts)
}

fn to_polygon(geometry: &Geometry<f64>) -> shapefile::Polygon {
    let mut rings = Vec::new();
    match geometry {
        Geometry::Polygon(p) => polygon_rings(p, &mut rings),
        Geometry::MultiPolygon(mp) => {
            for p in mp {
                polygon_rings(p, &mut rings);
            }
        },
        Geometry::Rect(r) => polygon_rings(&r.to_polygon(), &mut rings),
        Geometry::Triangle(t) => polygon_rings(&t.to_polygon(), &mut rings),
        _ => {},
    }
    shapefile::Polygon::with_rings(rings)
}

fn write_rows<T: Write + Seek, S: EsriShape>(
    writer: &mut shapefile::Writer<T>,
    rows: Vec<(S, Record)>,
) -> SpatialWriteResult<()> {
    for (shape, record) in &rows {
        writer
            .write_shape_and_record(shape, record)
            .map_err(|err| SpatialFormatWriteError::encode(format!("Shapefile: {err}")))?;
    }
    Ok(())
}

/// Write `<base_name>.shp/.shx/.dbf[/.prj]` into `dir`, returning the written parts.
///
/// Rows without a geometry are skipped.
///
/// # Errors
///
/// Returns an error if the geometries do not share one shape family, a field
/// cannot be declared, or a file cannot be written.
pub fn write_shapefile(
    table: &FeatureTable,
    dir: &Path,
    base_name: &str,
) -> SpatialWriteResult<Vec<PathBuf>> {
    let family = table_family(table)?.unwrap_or(ShapeFamily::Polygon);
    let (table_builder, fields) = table_fields(table)?;

    let records = table.features().iter().filter_map(|feature| {
        let geometry = feature.geometry.as_ref()?;
        let mut record = Record::default();
        for (spec, value) in fields.iter().zip(&feature.attributes) {
            record.insert(spec.name.clone(), field_value(&spec.kind, value));
        }
        Some((geometry, record))
    });

    let skipped = table.geometries().filter(Option::is_none).count();
    if skipped > 0 {
        log::warn!("Skipping {skipped} rows without geometry; Shapefile rows need a shape");
    }

    let shp_path = dir.join(format!("{base_name}.shp"));
    let mut writer = shapefile::Writer::from_path(&shp_path, table_builder)
        .map_err(|err| SpatialFormatWriteError::encode(format!("Shapefile: {err}")))?;
    match family {
        ShapeFamily::Point => write_rows(
            &mut writer,
            records
                .filter_map(|(g, r)| match g {
                    Geometry::Point(p) => Some((point(p.0), r)),
                    _ => None,
                })
                .collect(),
        )?,
        ShapeFamily::Multipoint => write_rows(
            &mut writer,
            records.map(|(g, r)| (to_multipoint(g), r)).collect(),
        )?,
        ShapeFamily::Polyline => write_rows(
            &mut writer,
            records.map(|(g, r)| (to_polyline(g), r)).collect(),
        )?,
        ShapeFamily::Polygon => write_rows(
            &mut writer,
            records.map(|(g, r)| (to_polygon(g), r)).collect(),
        )?,
    }
    drop(writer);

    let mut parts = vec![
        shp_path.clone(),
        shp_path.with_extension("shx"),
        shp_path.with_extension("dbf"),
    ];
    match table.srid().and_then(prj_for_epsg) {
        Some(wkt) => {
            let prj_path = shp_path.with_extension("prj");
            std::fs::write(&prj_path, wkt)?;
            parts.push(prj_path);
        },
        None => log::warn!(
            "No .prj definition for {:?}; the Shapefile carries no spatial reference",
            table.srid()
        ),
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, polygon};
    use geoflip_core_common::TableBuilder;

    fn table_of(geometries: Vec<Geometry<f64>>) -> FeatureTable {
        let mut builder = TableBuilder::new();
        for g in geometries {
            builder.push_row(Some(g), Vec::<(String, AttributeValue)>::new());
        }
        builder.finish(Some(4326))
    }

    #[test]
    fn test_field_names_truncated_and_deduplicated() {
        let names = dbf_field_names(["population_2020", "population_2021", "id", "ID"]);
        assert_eq!(names, ["population", "populati_1", "id", "ID_1"]);
        assert!(names.iter().all(|n| n.len() <= MAX_FIELD_NAME_LEN));
    }

    #[test]
    fn test_points_and_multipoints_combine() {
        let table = table_of(vec![
            point!(x: 0.0, y: 0.0).into(),
            geo_types::MultiPoint::from(vec![(1.0, 1.0), (2.0, 2.0)]).into(),
        ]);
        assert_eq!(table_family(&table).unwrap(), Some(ShapeFamily::Multipoint));
    }

    #[test]
    fn test_mixed_families_rejected() {
        let table = table_of(vec![
            point!(x: 0.0, y: 0.0).into(),
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into(),
        ]);
        let err = table_family(&table).unwrap_err();
        assert!(err.to_string().contains("one shape type"));
    }

    #[test]
    fn test_polygon_rings_include_holes() {
        let with_hole: Geometry<f64> = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0)]],
        )
        .into();
        let shape = to_polygon(&with_hole);
        assert_eq!(shape.rings().len(), 2);
    }

    #[test]
    fn test_character_values_fit_the_field() {
        let long = "x".repeat(400);
        match field_value(&FieldKind::Character, &AttributeValue::Text(long)) {
            FieldValue::Character(Some(text)) => assert_eq!(text.len(), MAX_CHARACTER_LEN),
            other => panic!("unexpected {other:?}"),
        }
    }
}
