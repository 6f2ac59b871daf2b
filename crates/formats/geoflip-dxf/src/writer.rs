//! Drawing a feature table as DXF entities.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use dxf::entities::{Entity, EntityType, LwPolyline, ModelPoint, Solid};
use dxf::enums::AcadVersion;
use dxf::tables::Layer;
use dxf::{Drawing, LwPolylineVertex};
use geo::TriangulateEarcut;
use geo_types::{Coord, Geometry, LineString, Polygon};
use geoflip_core_common::{FeatureTable, FeatureWriter, Format, geometry_type_name};
use geoflip_format_shared::{SpatialFormatWriteError, SpatialWriteResult};

use crate::reader::layer_name;
use crate::{DEFAULT_LAYER, LAYER_COLUMN};

/// Writes `<base_name>.dxf` in the AutoCAD 2018 dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct DxfWriter;

impl FeatureWriter for DxfWriter {
    type Error = SpatialFormatWriteError;

    fn format(&self) -> Format {
        Format::Dxf
    }

    fn write_path(
        &self,
        table: &FeatureTable,
        dir: &Path,
        base_name: &str,
    ) -> SpatialWriteResult<PathBuf> {
        let path = dir.join(format!("{base_name}.{}", Format::Dxf.output_extension()));
        let drawing = build_drawing(table);
        let file = File::create(&path).map_err(|source| SpatialFormatWriteError::Io {
            source,
            context: Some(path.display().to_string()),
        })?;
        let mut out = BufWriter::new(file);
        drawing
            .save(&mut out)
            .map_err(|err| SpatialFormatWriteError::encode(format!("DXF: {err}")))?;
        out.flush()?;
        Ok(path)
    }
}

/// Build a drawing holding one entity group per row.
///
/// Rows are placed on the layer named by their `layer` column when present.
#[must_use]
pub fn build_drawing(table: &FeatureTable) -> Drawing {
    let mut drawing = Drawing::new();
    drawing.header.version = AcadVersion::R2018;

    let layer_idx = table.column_index(LAYER_COLUMN);
    let mut layers = BTreeSet::new();
    let mut skipped = 0usize;

    for feature in table.features() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let layer = layer_name(layer_idx.and_then(|idx| feature.attributes.get(idx)));
        let entities = geometry_entities(geometry);
        if entities.is_empty() {
            skipped += 1;
            log::warn!(
                "Skipping {} geometry; DXF output draws points, lines and polygons",
                geometry_type_name(geometry)
            );
            continue;
        }
        for mut entity in entities {
            entity.common.layer.clone_from(&layer);
            drawing.add_entity(entity);
        }
        layers.insert(layer);
    }

    for name in layers {
        if name != DEFAULT_LAYER {
            drawing.add_layer(Layer {
                name,
                ..Default::default()
            });
        }
    }
    if skipped > 0 {
        log::warn!("{skipped} rows were not drawn");
    }
    drawing
}

fn dxf_point(c: Coord<f64>) -> dxf::Point {
    dxf::Point::new(c.x, c.y, 0.0)
}

fn model_point(c: Coord<f64>) -> Entity {
    Entity::new(EntityType::ModelPoint(ModelPoint {
        location: dxf_point(c),
        ..Default::default()
    }))
}

fn lwpolyline(line: &LineString<f64>, closed: bool) -> Entity {
    let mut poly = LwPolyline::default();
    let coords = if closed && line.is_closed() && line.0.len() > 1 {
        &line.0[..line.0.len() - 1]
    } else {
        &line.0[..]
    };
    poly.vertices = coords
        .iter()
        .map(|c| LwPolylineVertex {
            x: c.x,
            y: c.y,
            ..Default::default()
        })
        .collect();
    poly.set_is_closed(closed);
    Entity::new(EntityType::LwPolyline(poly))
}

/// Closed outline per ring plus a SOLID triangle fill of the area between them.
fn polygon_entities(polygon: &Polygon<f64>, out: &mut Vec<Entity>) {
    out.push(lwpolyline(polygon.exterior(), true));
    for interior in polygon.interiors() {
        out.push(lwpolyline(interior, true));
    }
    for triangle in polygon.earcut_triangles() {
        let [a, b, c] = [dxf_point(triangle.0), dxf_point(triangle.1), dxf_point(triangle.2)];
        // A SOLID with equal third and fourth corners is a triangle.
        let solid = Solid {
            first_corner: a,
            second_corner: b,
            third_corner: c.clone(),
            fourth_corner: c,
            ..Default::default()
        };
        out.push(Entity::new(EntityType::Solid(solid)));
    }
}

fn geometry_entities(geometry: &Geometry<f64>) -> Vec<Entity> {
    let mut out = Vec::new();
    match geometry {
        Geometry::Point(p) => out.push(model_point(p.0)),
        Geometry::MultiPoint(mp) => out.extend(mp.iter().map(|p| model_point(p.0))),
        Geometry::Line(l) => {
            out.push(lwpolyline(&LineString::new(vec![l.start, l.end]), false));
        },
        Geometry::LineString(ls) => out.push(lwpolyline(ls, false)),
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                out.push(lwpolyline(ls, false));
            }
        },
        Geometry::Polygon(p) => polygon_entities(p, &mut out),
        Geometry::MultiPolygon(mp) => {
            for p in mp {
                polygon_entities(p, &mut out);
            }
        },
        Geometry::Rect(r) => polygon_entities(&r.to_polygon(), &mut out),
        Geometry::Triangle(t) => polygon_entities(&t.to_polygon(), &mut out),
        Geometry::GeometryCollection(_) => {},
    }
    out
}
