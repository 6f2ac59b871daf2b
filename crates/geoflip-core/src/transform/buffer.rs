//! Buffer stage.

use std::convert::Infallible;

use geo::{Area, Buffer, Simplify, Validation};
use geo_types::{Coord, Geometry, MultiPolygon};
use geoflip_core_common::FeatureTable;

use super::BufferParams;
use crate::error::{Result, TransformError};
use crate::reproject::{Reprojector, is_geographic};

/// Default simplification tolerance as a fraction of the buffer distance.
pub const DEFAULT_SIMPLIFY_RATIO: f64 = 0.03;

/// EPSG code of the WGS 84 / UTM zone containing `centre` (lon/lat degrees).
#[must_use]
pub fn utm_zone_srid(centre: Coord<f64>) -> u32 {
    let zone = ((centre.x + 180.0) / 6.0).floor().clamp(0.0, 59.0) as u32 + 1;
    if centre.y >= 0.0 { 32600 + zone } else { 32700 + zone }
}

/// Buffer every geometry by `params`, simplifying the result.
///
/// Projected tables are buffered in their own unit, taken as meters. Tables in
/// a geographic reference are moved to the UTM zone of their centre, buffered
/// there and moved back.
///
/// # Errors
///
/// Returns `TransformError::MissingSpatialReference` for tables without srid
/// and propagates reprojection failures.
pub fn apply_buffer(
    table: FeatureTable,
    params: &BufferParams,
    reprojector: &dyn Reprojector,
) -> Result<FeatureTable> {
    params.validate()?;
    let srid = table.srid().ok_or_else(|| TransformError::MissingSpatialReference {
        operation: "buffer".to_string(),
    })?;
    let distance = params.distance_in_meters();
    let tolerance = params.effective_tolerance();

    if !is_geographic(srid) {
        return Ok(buffer_table(table, distance, tolerance));
    }
    let Some(extent) = table.bounding_rect() else {
        return Ok(buffer_table(table, distance, tolerance));
    };
    let zone = utm_zone_srid(extent.center());
    log::info!("Buffering EPSG:{srid} data in EPSG:{zone}");
    let projected = reprojector.reproject(table, zone)?;
    let buffered = buffer_table(projected, distance, tolerance);
    reprojector.reproject(buffered, srid)
}

fn buffer_table(table: FeatureTable, distance: f64, tolerance: f64) -> FeatureTable {
    let Ok(table) = table.try_map_geometries(|geometry| {
        Ok::<_, Infallible>(buffer_geometry(&geometry, distance, tolerance))
    });
    table
}

fn buffer_geometry(geometry: &Geometry<f64>, distance: f64, tolerance: f64) -> Geometry<f64> {
    let buffered = simplify(geometry.buffer(distance), tolerance);
    if buffered.0.len() == 1 {
        let mut parts = buffered.0;
        Geometry::Polygon(parts.remove(0))
    } else {
        Geometry::MultiPolygon(buffered)
    }
}

/// Simplify unless that would empty, flatten or invalidate the shape.
fn simplify(buffered: MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    if tolerance <= 0.0 || buffered.0.is_empty() {
        return buffered;
    }
    let simplified = buffered.simplify(tolerance);
    let keeps_shape = simplified.0.len() == buffered.0.len()
        && simplified.unsigned_area() > 0.0
        && simplified.is_valid();
    if keeps_shape {
        simplified
    } else {
        log::debug!("Simplification at tolerance {tolerance} degenerates the buffer; keeping it as is");
        buffered
    }
}

#[cfg(test)]
mod tests {
    use geo::Area;
    use geo_types::{line_string, point};
    use geoflip_core_common::{AttributeValue, TableBuilder};

    use super::*;
    use crate::error::{ErrorKind, GeoflipError};
    use crate::reproject::IdentityReprojector;
    use crate::transform::DistanceUnit;

    fn table(geometry: Option<Geometry<f64>>, srid: Option<u32>) -> FeatureTable {
        let mut builder = TableBuilder::new();
        builder.push_row(geometry, [("id", AttributeValue::Integer(1))]);
        builder.finish(srid)
    }

    fn area(table: &FeatureTable) -> f64 {
        table.features()[0].geometry.as_ref().map_or(0.0, Area::unsigned_area)
    }

    #[test]
    fn test_utm_zone() {
        assert_eq!(utm_zone_srid(Coord { x: 115.86, y: -31.95 }), 32750);
        assert_eq!(utm_zone_srid(Coord { x: -0.12, y: 51.5 }), 32630);
        assert_eq!(utm_zone_srid(Coord { x: 180.0, y: 10.0 }), 32660);
        assert_eq!(utm_zone_srid(Coord { x: -180.0, y: 10.0 }), 32601);
    }

    #[test]
    fn test_point_becomes_polygon() {
        let params = BufferParams::new(10.0, DistanceUnit::Meters);
        let out = apply_buffer(
            table(Some(point!(x: 500_000.0, y: 6_000_000.0).into()), Some(28350)),
            &params,
            &IdentityReprojector,
        )
        .unwrap();
        assert!(matches!(out.features()[0].geometry, Some(Geometry::Polygon(_))));
        let expected = std::f64::consts::PI * 100.0;
        assert!((area(&out) - expected).abs() / expected < 0.1, "{}", area(&out));
        assert_eq!(out.value(0, "id"), Some(&AttributeValue::Integer(1)));
    }

    #[test]
    fn test_area_grows_with_distance() {
        let line: Geometry<f64> = line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)].into();
        let areas: Vec<f64> = [1.0, 5.0, 20.0, 50.0]
            .into_iter()
            .map(|d| {
                let params = BufferParams::new(d, DistanceUnit::Meters);
                area(&apply_buffer(table(Some(line.clone()), Some(3857)), &params, &IdentityReprojector).unwrap())
            })
            .collect();
        assert!(areas.windows(2).all(|w| w[0] <= w[1]), "{areas:?}");
    }

    #[test]
    fn test_units_match_equivalent_meters() {
        let centre: Geometry<f64> = point!(x: 0.0, y: 0.0).into();
        for (distance, unit) in [
            (0.25, DistanceUnit::Kilometers),
            (820.0, DistanceUnit::Feet),
            (0.1, DistanceUnit::Miles),
        ] {
            let params = BufferParams::new(distance, unit);
            let meters = BufferParams::new(params.distance_in_meters(), DistanceUnit::Meters);
            let a = area(&apply_buffer(table(Some(centre.clone()), Some(3857)), &params, &IdentityReprojector).unwrap());
            let b = area(&apply_buffer(table(Some(centre.clone()), Some(3857)), &meters, &IdentityReprojector).unwrap());
            assert!((a - b).abs() <= a * 1e-9, "{unit}: {a} vs {b}");
        }
    }

    #[test]
    fn test_null_geometry_stays_null() {
        let params = BufferParams::new(10.0, DistanceUnit::Meters);
        let out = apply_buffer(table(None, Some(28350)), &params, &IdentityReprojector).unwrap();
        assert!(out.features()[0].geometry.is_none());
    }

    #[test]
    fn test_missing_srid() {
        let params = BufferParams::new(10.0, DistanceUnit::Meters);
        let err = apply_buffer(table(Some(point!(x: 0.0, y: 0.0).into()), None), &params, &IdentityReprojector)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingSpatialReference);
        assert!(matches!(err, GeoflipError::Transform(_)));
    }

    #[test]
    fn test_oversized_tolerance_keeps_buffer() {
        let params = BufferParams::new(1.0, DistanceUnit::Meters).with_simplify_tolerance(1000.0);
        let out = apply_buffer(table(Some(point!(x: 0.0, y: 0.0).into()), Some(3857)), &params, &IdentityReprojector)
            .unwrap();
        assert!(area(&out) > 0.0);
    }

    #[test]
    fn test_geographic_table_returns_to_its_srid() {
        let params = BufferParams::new(50.0, DistanceUnit::Meters);
        let out = apply_buffer(
            table(Some(point!(x: 115.86, y: -31.95).into()), Some(4326)),
            &params,
            &IdentityReprojector,
        )
        .unwrap();
        assert_eq!(out.srid(), Some(4326));
    }
}
