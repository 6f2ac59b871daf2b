//! Union (dissolve) stage with attribute aggregation.

use std::collections::HashSet;

use chrono::TimeDelta;
use geo::{BoundingRect, Intersects, unary_union};
use geo_types::{Geometry, MultiPolygon, Rect};
use geoflip_core_common::{
    AttributeValue, Column, ColumnType, Feature, FeatureTable, geometry_type_name,
};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};

use crate::error::{Result, TransformError};

type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Merge overlapping polygons into disjoint regions.
///
/// Every output polygon carries the aggregate of the rows whose geometry
/// intersects it. Rows without a geometry take no part.
///
/// # Errors
///
/// Returns `TransformError::InvalidGeometryType` when a row holds anything
/// other than a polygon or multipolygon.
pub fn apply_union(table: FeatureTable) -> Result<FeatureTable> {
    let (schema, features, srid) = table.into_parts();

    let mut inputs: Vec<(usize, MultiPolygon<f64>)> = Vec::with_capacity(features.len());
    for (row, feature) in features.iter().enumerate() {
        match &feature.geometry {
            None => {},
            Some(Geometry::Polygon(p)) => inputs.push((row, MultiPolygon::new(vec![p.clone()]))),
            Some(Geometry::MultiPolygon(mp)) => inputs.push((row, mp.clone())),
            Some(other) => {
                return Err(TransformError::InvalidGeometryType {
                    operation: "union".to_string(),
                    geometry_type: geometry_type_name(other).to_string(),
                    row,
                }
                .into());
            },
        }
    }

    let merged = unary_union(inputs.iter().map(|(_, mp)| mp));
    log::debug!("Union merged {} rows into {} polygons", inputs.len(), merged.0.len());

    let index: RTree<IndexedBox> = RTree::bulk_load(
        inputs
            .iter()
            .enumerate()
            .filter_map(|(i, (_, mp))| mp.bounding_rect().map(|r| IndexedBox::new(rectangle(r), i)))
            .collect(),
    );

    let mut rows = Vec::with_capacity(merged.0.len());
    for polygon in merged {
        let mut matched: Vec<usize> = match polygon.bounding_rect() {
            Some(r) => index
                .locate_in_envelope_intersecting(&envelope(r))
                .map(|candidate| candidate.data)
                .filter(|&i| inputs[i].1.intersects(&polygon))
                .map(|i| inputs[i].0)
                .collect(),
            None => Vec::new(),
        };
        matched.sort_unstable();

        let attributes = if matched.is_empty() {
            log::warn!("A unioned polygon matched no input rows; its attributes are null");
            vec![AttributeValue::Null; schema.len()]
        } else {
            schema
                .columns()
                .iter()
                .enumerate()
                .map(|(col, column)| {
                    aggregate_column(column, matched.iter().map(|&row| &features[row].attributes[col]))
                })
                .collect()
        };
        rows.push(Feature::new(Some(Geometry::Polygon(polygon)), attributes));
    }

    FeatureTable::try_new(schema, rows, srid).map_err(|err| {
        TransformError::Kernel {
            operation: "union".to_string(),
            message: err.to_string(),
        }
        .into()
    })
}

fn rectangle(r: Rect<f64>) -> Rectangle<[f64; 2]> {
    Rectangle::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y])
}

fn envelope(r: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y])
}

/// Which end of a timestamp range a column holds, judged by its name.
fn prefers_earliest(name: &str) -> bool {
    let name = name.to_lowercase();
    name.starts_with("start") || name.ends_with("start") || name.contains("start_")
}

/// Aggregate one column over the matched rows.
///
/// Numbers and durations sum, booleans are OR-ed, timestamps take the minimum
/// for `start` columns and the maximum otherwise, and everything else becomes
/// the distinct values joined with `", "`. Nulls are skipped; a column with no
/// values yields null.
fn aggregate_column<'a>(
    column: &Column,
    values: impl Iterator<Item = &'a AttributeValue>,
) -> AttributeValue {
    let values: Vec<&AttributeValue> = values.filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return AttributeValue::Null;
    }

    match column.column_type {
        ColumnType::Integer => AttributeValue::Integer(
            values
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::Integer(i) => Some(*i),
                    _ => None,
                })
                .fold(0i64, i64::saturating_add),
        ),
        ColumnType::Float => AttributeValue::Float(
            values
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::Float(f) => Some(*f),
                    AttributeValue::Integer(i) => Some(*i as f64),
                    _ => None,
                })
                .sum(),
        ),
        ColumnType::Boolean => {
            AttributeValue::Boolean(values.iter().any(|v| matches!(v, AttributeValue::Boolean(true))))
        },
        ColumnType::Timestamp => {
            let stamps = values.iter().filter_map(|v| match v {
                AttributeValue::Timestamp(t) => Some(*t),
                _ => None,
            });
            let picked = if prefers_earliest(&column.name) {
                stamps.min()
            } else {
                stamps.max()
            };
            picked.map_or(AttributeValue::Null, AttributeValue::Timestamp)
        },
        ColumnType::Duration => AttributeValue::Duration(
            values
                .iter()
                .filter_map(|v| match v {
                    AttributeValue::Duration(d) => Some(*d),
                    _ => None,
                })
                .fold(TimeDelta::zero(), saturating_duration_add),
        ),
        ColumnType::Text => {
            let mut seen = HashSet::new();
            let distinct: Vec<String> = values
                .iter()
                .map(ToString::to_string)
                .filter(|s| seen.insert(s.clone()))
                .collect();
            AttributeValue::Text(distinct.join(", "))
        },
    }
}

fn saturating_duration_add(acc: TimeDelta, d: TimeDelta) -> TimeDelta {
    acc.checked_add(&d)
        .unwrap_or(if d < TimeDelta::zero() { TimeDelta::MIN } else { TimeDelta::MAX })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use geo::Area;
    use geo_types::{line_string, polygon};
    use geoflip_core_common::TableBuilder;

    use super::*;
    use crate::error::ErrorKind;

    fn square(x: f64, y: f64, size: f64) -> Geometry<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]
        .into()
    }

    fn union_of(rows: Vec<(Geometry<f64>, Vec<(&str, AttributeValue)>)>) -> FeatureTable {
        let mut builder = TableBuilder::new();
        for (geometry, attributes) in rows {
            builder.push_row(Some(geometry), attributes);
        }
        apply_union(builder.finish(Some(28350))).unwrap()
    }

    #[test]
    fn test_overlapping_polygons_sum_numbers() {
        let out = union_of(vec![
            (square(0.0, 0.0, 10.0), vec![("population", AttributeValue::Integer(10))]),
            (square(5.0, 5.0, 10.0), vec![("population", AttributeValue::Integer(20))]),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, "population"), Some(&AttributeValue::Integer(30)));
        let area = out.features()[0].geometry.as_ref().unwrap().unsigned_area();
        assert!((area - 175.0).abs() < 1e-6, "{area}");
    }

    #[test]
    fn test_disjoint_polygons_keep_their_values() {
        let out = union_of(vec![
            (square(0.0, 0.0, 1.0), vec![("population", AttributeValue::Integer(10))]),
            (square(5.0, 5.0, 1.0), vec![("population", AttributeValue::Integer(20))]),
        ]);
        assert_eq!(out.len(), 2);
        let mut values: Vec<_> = (0..2).map(|row| out.value(row, "population").cloned()).collect();
        values.sort_by_key(|v| match v {
            Some(AttributeValue::Integer(i)) => *i,
            _ => 0,
        });
        assert_eq!(
            values,
            [Some(AttributeValue::Integer(10)), Some(AttributeValue::Integer(20))]
        );
    }

    #[test]
    fn test_text_and_boolean_aggregation() {
        let out = union_of(vec![
            (
                square(0.0, 0.0, 10.0),
                vec![("zone", AttributeValue::Text("a".into())), ("protected", AttributeValue::Boolean(false))],
            ),
            (
                square(2.0, 2.0, 10.0),
                vec![("zone", AttributeValue::Text("a".into())), ("protected", AttributeValue::Boolean(true))],
            ),
            (
                square(4.0, 4.0, 10.0),
                vec![("zone", AttributeValue::Text("b".into())), ("protected", AttributeValue::Null)],
            ),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, "zone"), Some(&AttributeValue::Text("a, b".into())));
        assert_eq!(out.value(0, "protected"), Some(&AttributeValue::Boolean(true)));
    }

    #[test]
    fn test_timestamps_follow_column_names() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let out = union_of(vec![
            (
                square(0.0, 0.0, 10.0),
                vec![
                    ("start_date", AttributeValue::Timestamp(late)),
                    ("end_date", AttributeValue::Timestamp(early)),
                    ("surveyed", AttributeValue::Timestamp(early)),
                ],
            ),
            (
                square(5.0, 0.0, 10.0),
                vec![
                    ("start_date", AttributeValue::Timestamp(early)),
                    ("end_date", AttributeValue::Timestamp(late)),
                    ("surveyed", AttributeValue::Timestamp(late)),
                ],
            ),
        ]);
        assert_eq!(out.value(0, "start_date"), Some(&AttributeValue::Timestamp(early)));
        assert_eq!(out.value(0, "end_date"), Some(&AttributeValue::Timestamp(late)));
        assert_eq!(out.value(0, "surveyed"), Some(&AttributeValue::Timestamp(late)));
    }

    #[test]
    fn test_float_and_duration_columns_sum() {
        let out = union_of(vec![
            (
                square(0.0, 0.0, 10.0),
                vec![
                    ("area_ha", AttributeValue::Float(1.25)),
                    ("survey_time", AttributeValue::Duration(TimeDelta::minutes(30))),
                ],
            ),
            (
                square(5.0, 0.0, 10.0),
                vec![
                    ("area_ha", AttributeValue::Integer(2)),
                    ("survey_time", AttributeValue::Duration(TimeDelta::minutes(45))),
                ],
            ),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, "area_ha"), Some(&AttributeValue::Float(3.25)));
        assert_eq!(
            out.value(0, "survey_time"),
            Some(&AttributeValue::Duration(TimeDelta::minutes(75)))
        );
    }

    #[test]
    fn test_duration_sum_saturates() {
        assert_eq!(saturating_duration_add(TimeDelta::MAX, TimeDelta::seconds(1)), TimeDelta::MAX);
        assert_eq!(saturating_duration_add(TimeDelta::MIN, TimeDelta::seconds(-1)), TimeDelta::MIN);
        assert_eq!(
            saturating_duration_add(TimeDelta::seconds(2), TimeDelta::seconds(3)),
            TimeDelta::seconds(5)
        );
    }

    #[test]
    fn test_date_text_mixed_with_numbers_joins_as_text() {
        let out = union_of(vec![
            (square(0.0, 0.0, 10.0), vec![("ref", AttributeValue::Text("2024-01-01".into()))]),
            (square(5.0, 0.0, 10.0), vec![("ref", AttributeValue::Integer(5))]),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, "ref"), Some(&AttributeValue::Text("2024-01-01, 5".into())));
    }

    #[test]
    fn test_all_null_column_stays_null_and_schema_is_kept() {
        let out = union_of(vec![
            (
                square(0.0, 0.0, 10.0),
                vec![("id", AttributeValue::Integer(1)), ("note", AttributeValue::Null)],
            ),
            (
                square(5.0, 0.0, 10.0),
                vec![("id", AttributeValue::Integer(2)), ("note", AttributeValue::Null)],
            ),
        ]);
        let names: Vec<_> = out.schema().names().collect();
        assert_eq!(names, ["id", "note"]);
        assert_eq!(out.value(0, "note"), Some(&AttributeValue::Null));
    }

    #[test]
    fn test_empty_table() {
        let out = apply_union(TableBuilder::new().finish(Some(4326))).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.srid(), Some(4326));
    }

    #[test]
    fn test_lines_are_rejected() {
        let mut builder = TableBuilder::new();
        builder.push_row(Some(square(0.0, 0.0, 1.0)), [("id", AttributeValue::Integer(1))]);
        builder.push_row(
            Some(geo_types::line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into()),
            [("id", AttributeValue::Integer(2))],
        );
        let err = apply_union(builder.finish(Some(28350))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGeometryType);
        assert!(err.to_string().contains("LineString at row 1"), "{err}");
    }
}
