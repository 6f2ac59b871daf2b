//! Decoding DXF drawings into a feature table.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use dxf::entities::{Entity, EntityType};
use dxf::Drawing;
use geo::{Area, Contains, Coord, LineString, Polygon};
use geo_types::{Geometry, Point};
use geoflip_core_common::{AttributeValue, FeatureReader, FeatureTable, Format, TableBuilder};
use geoflip_format_shared::{SpatialFormatReadError, SpatialFormatResult};

use crate::{DEFAULT_LAYER, LAYER_COLUMN};

/// Reads POINT, LINE, LWPOLYLINE and POLYLINE entities from the model space.
#[derive(Debug, Clone, Copy, Default)]
pub struct DxfReader;

impl FeatureReader for DxfReader {
    type Error = SpatialFormatReadError;

    fn format(&self) -> Format {
        Format::Dxf
    }

    fn read_path(&self, path: &Path, srid: Option<u32>) -> SpatialFormatResult<FeatureTable> {
        let srid = srid.ok_or_else(|| SpatialFormatReadError::MissingSpatialReference {
            format: Format::Dxf.to_string(),
        })?;
        let context = path.display().to_string();
        let file = File::open(path).map_err(|source| SpatialFormatReadError::Io {
            source,
            context: Some(context.clone()),
        })?;
        read_drawing(&mut BufReader::new(file), srid, &context)
    }
}

/// A drawn item before rings are grouped into polygons.
enum Item {
    Geometry(Geometry<f64>),
    Ring(LineString<f64>),
}

/// Decode a drawing from `input`.
///
/// Closed polylines become polygons; a closed ring lying inside another closed
/// ring on the same layer becomes a hole of it. SOLID fills are ignored.
///
/// # Errors
///
/// Returns a parse error if the drawing cannot be decoded.
pub fn read_drawing<R: Read>(
    input: &mut R,
    srid: u32,
    context: &str,
) -> SpatialFormatResult<FeatureTable> {
    let drawing = Drawing::load(input).map_err(|err| {
        SpatialFormatReadError::parse(format!("Invalid DXF drawing: {err}"), context)
    })?;

    let mut items: Vec<(usize, String, Item)> = Vec::new();
    let mut skipped = 0usize;
    for (idx, entity) in drawing.entities().enumerate() {
        match entity_item(entity) {
            Some(item) => items.push((idx, entity.common.layer.clone(), item)),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        log::debug!("Ignored {skipped} DXF entities without a vector counterpart in {context}");
    }

    let mut rows = assemble_rows(items);
    rows.sort_by_key(|(idx, _, _)| *idx);

    let mut builder = TableBuilder::new().with_columns([LAYER_COLUMN]);
    for (_, layer, geometry) in rows {
        builder.push_row(Some(geometry), [(LAYER_COLUMN, AttributeValue::Text(layer))]);
    }
    log::debug!("Read {} features from {context}", builder.len());
    Ok(builder.finish(Some(srid)))
}

fn coord(x: f64, y: f64) -> Coord<f64> {
    Coord { x, y }
}

fn path_item(coords: Vec<Coord<f64>>, closed: bool) -> Option<Item> {
    let mut line = LineString::new(coords);
    if closed && line.0.len() >= 3 {
        line.close();
        return Some(Item::Ring(line));
    }
    if line.0.len() < 2 {
        return None;
    }
    Some(Item::Geometry(Geometry::LineString(line)))
}

fn entity_item(entity: &Entity) -> Option<Item> {
    match &entity.specific {
        EntityType::ModelPoint(p) => Some(Item::Geometry(Geometry::Point(Point::new(
            p.location.x,
            p.location.y,
        )))),
        EntityType::Line(line) => Some(Item::Geometry(Geometry::LineString(LineString::new(
            vec![coord(line.p1.x, line.p1.y), coord(line.p2.x, line.p2.y)],
        )))),
        EntityType::LwPolyline(poly) => path_item(
            poly.vertices.iter().map(|v| coord(v.x, v.y)).collect(),
            poly.is_closed(),
        ),
        EntityType::Polyline(poly) => path_item(
            poly.vertices()
                .map(|v| coord(v.location.x, v.location.y))
                .collect(),
            poly.is_closed(),
        ),
        _ => None,
    }
}

/// Group each layer's closed rings into polygons by nesting depth: rings at an
/// even depth are shells, rings at an odd depth are holes of their innermost
/// container.
fn assemble_rows(items: Vec<(usize, String, Item)>) -> Vec<(usize, String, Geometry<f64>)> {
    let mut rows = Vec::new();
    let mut rings_by_layer: BTreeMap<String, Vec<(usize, LineString<f64>)>> = BTreeMap::new();
    for (idx, layer, item) in items {
        match item {
            Item::Geometry(geometry) => rows.push((idx, layer, geometry)),
            Item::Ring(ring) => rings_by_layer.entry(layer).or_default().push((idx, ring)),
        }
    }

    for (layer, rings) in rings_by_layer {
        let shells: Vec<Polygon<f64>> = rings
            .iter()
            .map(|(_, ring)| Polygon::new(ring.clone(), vec![]))
            .collect();
        let areas: Vec<f64> = shells.iter().map(Area::unsigned_area).collect();

        let mut parents: Vec<Option<usize>> = vec![None; rings.len()];
        let mut depths = vec![0usize; rings.len()];
        for (i, (_, ring)) in rings.iter().enumerate() {
            for (j, shell) in shells.iter().enumerate() {
                if i == j || areas[j] <= areas[i] || !shell.contains(ring) {
                    continue;
                }
                depths[i] += 1;
                if parents[i].is_none_or(|p| areas[j] < areas[p]) {
                    parents[i] = Some(j);
                }
            }
        }

        let mut holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); rings.len()];
        for i in 0..rings.len() {
            if depths[i] % 2 == 1
                && let Some(parent) = parents[i]
            {
                holes[parent].push(rings[i].1.clone());
            }
        }
        for (i, (idx, ring)) in rings.into_iter().enumerate() {
            if depths[i] % 2 == 0 {
                let interiors = std::mem::take(&mut holes[i]);
                rows.push((idx, layer.clone(), Geometry::Polygon(Polygon::new(ring, interiors))));
            }
        }
    }
    rows
}

/// Layer name of a row, falling back to the default layer.
pub(crate) fn layer_name(value: Option<&AttributeValue>) -> String {
    match value {
        Some(AttributeValue::Text(name)) if !name.trim().is_empty() => name.clone(),
        _ => DEFAULT_LAYER.to_string(),
    }
}
