//! The canonical in-memory feature table.
//!
//! Every input codec produces a [`FeatureTable`], every transformation consumes
//! one and returns a new one, and every output codec serialises one. Rows store
//! their attributes positionally, aligned with the table [`Schema`], so all
//! rows share the same column set and column order by construction.

use std::collections::HashMap;

use geo_types::{Geometry, Rect};
use thiserror::Error;

use crate::value::{AttributeValue, ColumnType};

/// EPSG code of WGS 84 geographic coordinates.
pub const WGS84: u32 = 4326;

/// Errors raised when a table is assembled from inconsistent parts.
#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    /// A row does not have one value per column.
    #[error("Row {row} has {found} attribute values but the schema has {expected} columns")]
    WidthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A value does not match its column's declared type.
    #[error("Column '{column}' is declared {expected} but row {row} holds a {found} value")]
    TypeMismatch {
        column: String,
        row: usize,
        expected: ColumnType,
        found: ColumnType,
    },

    /// Two columns share a name.
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),
}

/// One attribute column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered attribute columns of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Build a schema, rejecting duplicate column names.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::DuplicateColumn`] if two columns share a name.
    pub fn try_new(columns: Vec<Column>) -> Result<Self, TableError> {
        let mut seen = HashMap::with_capacity(columns.len());
        for column in &columns {
            if seen.insert(column.name.as_str(), ()).is_some() {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of the column called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// One geometry plus its attribute row.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Vec<AttributeValue>,
}

impl Feature {
    #[must_use]
    pub fn new(geometry: Option<Geometry<f64>>, attributes: Vec<AttributeValue>) -> Self {
        Self {
            geometry,
            attributes,
        }
    }
}

/// Canonical collection of features sharing one spatial reference and schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    schema: Schema,
    features: Vec<Feature>,
    srid: Option<u32>,
}

impl FeatureTable {
    /// An empty table with the given schema.
    #[must_use]
    pub fn empty(schema: Schema, srid: Option<u32>) -> Self {
        Self {
            schema,
            features: Vec::new(),
            srid,
        }
    }

    /// Assemble a table, checking every row against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::WidthMismatch`] or [`TableError::TypeMismatch`] when
    /// a row does not conform to the schema.
    pub fn try_new(
        schema: Schema,
        features: Vec<Feature>,
        srid: Option<u32>,
    ) -> Result<Self, TableError> {
        for (row, feature) in features.iter().enumerate() {
            check_row(&schema, row, feature)?;
        }
        Ok(Self {
            schema,
            features,
            srid,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[must_use]
    pub fn srid(&self) -> Option<u32> {
        self.srid
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Returns the same rows tagged with another spatial reference.
    ///
    /// Coordinates are not touched; use a reprojection for that.
    #[must_use]
    pub fn with_srid(mut self, srid: Option<u32>) -> Self {
        self.srid = srid;
        self
    }

    /// Append a row, checking it against the schema.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::WidthMismatch`] or [`TableError::TypeMismatch`].
    pub fn push(&mut self, feature: Feature) -> Result<(), TableError> {
        check_row(&self.schema, self.features.len(), &feature)?;
        self.features.push(feature);
        Ok(())
    }

    /// Position of the column called `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    /// Extent of every non-null geometry, `None` for a table without coordinates.
    #[must_use]
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        coordinate_extent(self)
    }

    /// Attribute value of `row` in the column called `column`.
    #[must_use]
    pub fn value(&self, row: usize, column: &str) -> Option<&AttributeValue> {
        let idx = self.schema.index_of(column)?;
        self.features.get(row).and_then(|f| f.attributes.get(idx))
    }

    pub fn geometries(&self) -> impl Iterator<Item = Option<&Geometry<f64>>> {
        self.features.iter().map(|f| f.geometry.as_ref())
    }

    /// Build a new table by transforming every non-null geometry.
    ///
    /// Attributes, schema and srid carry over unchanged.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn try_map_geometries<F, E>(self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(Geometry<f64>) -> Result<Geometry<f64>, E>,
    {
        let features = self
            .features
            .into_iter()
            .map(|feature| {
                let geometry = feature.geometry.map(&mut f).transpose()?;
                Ok::<Feature, E>(Feature {
                    geometry,
                    attributes: feature.attributes,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self {
            schema: self.schema,
            features,
            srid: self.srid,
        })
    }

    /// Distinct geometry type names in first-seen order.
    #[must_use]
    pub fn geometry_types(&self) -> Vec<&'static str> {
        let mut types = Vec::new();
        for geometry in self.geometries().flatten() {
            let name = geometry_type_name(geometry);
            if !types.contains(&name) {
                types.push(name);
            }
        }
        types
    }

    /// Decompose into schema, rows and srid.
    #[must_use]
    pub fn into_parts(self) -> (Schema, Vec<Feature>, Option<u32>) {
        (self.schema, self.features, self.srid)
    }
}

fn check_row(schema: &Schema, row: usize, feature: &Feature) -> Result<(), TableError> {
    if feature.attributes.len() != schema.len() {
        return Err(TableError::WidthMismatch {
            row,
            expected: schema.len(),
            found: feature.attributes.len(),
        });
    }
    for (column, value) in schema.columns().iter().zip(&feature.attributes) {
        if let Some(found) = value.column_type()
            && found != column.column_type
        {
            return Err(TableError::TypeMismatch {
                column: column.name.clone(),
                row,
                expected: column.column_type,
                found,
            });
        }
    }
    Ok(())
}

/// OGC name of a geometry's type.
#[must_use]
pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Incrementally assembles a [`FeatureTable`] from loosely keyed rows.
///
/// Codecs push rows as `(name, value)` pairs in whatever shape the source
/// provides; [`TableBuilder::finish`] fills missing values with null, infers
/// one type per column and coerces every value to it.
#[derive(Debug, Default)]
pub struct TableBuilder {
    names: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Feature>,
}

impl TableBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare columns up front so they keep their source order even when
    /// the first rows leave them empty.
    #[must_use]
    pub fn with_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.column_slot(name.into());
        }
        self
    }

    fn column_slot(&mut self, name: String) -> usize {
        if let Some(idx) = self.index.get(&name) {
            return *idx;
        }
        let idx = self.names.len();
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    /// Append one row.
    pub fn push_row<I, K>(&mut self, geometry: Option<Geometry<f64>>, attributes: I)
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        let mut values = vec![AttributeValue::Null; self.names.len()];
        for (name, value) in attributes {
            let idx = self.column_slot(name.into());
            if idx >= values.len() {
                values.resize(idx + 1, AttributeValue::Null);
            }
            values[idx] = value;
        }
        self.rows.push(Feature::new(geometry, values));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Infer column types and produce the table.
    #[must_use]
    pub fn finish(self, srid: Option<u32>) -> FeatureTable {
        let width = self.names.len();
        let mut rows = self.rows;
        for row in &mut rows {
            row.attributes.resize(width, AttributeValue::Null);
        }

        let types: Vec<ColumnType> = (0..width)
            .map(|idx| infer_column_type(rows.iter().map(|r| &r.attributes[idx])))
            .collect();

        for row in &mut rows {
            let values = std::mem::take(&mut row.attributes);
            row.attributes = values
                .into_iter()
                .zip(&types)
                .map(|(value, ty)| value.coerce(*ty))
                .collect();
        }

        let columns = self
            .names
            .into_iter()
            .zip(types)
            .map(|(name, ty)| Column::new(name, ty))
            .collect();

        FeatureTable {
            schema: Schema { columns },
            features: rows,
            srid,
        }
    }
}

/// Text columns whose every value reads as a timestamp become timestamp columns.
fn infer_column_type<'a>(values: impl Iterator<Item = &'a AttributeValue>) -> ColumnType {
    let mut inferred: Option<ColumnType> = None;
    let mut all_timestamps = true;
    for value in values {
        let Some(ty) = value.column_type() else {
            continue;
        };
        all_timestamps &= match value {
            AttributeValue::Text(text) => crate::value::parse_timestamp(text).is_some(),
            AttributeValue::Timestamp(_) => true,
            _ => false,
        };
        inferred = Some(inferred.map_or(ty, |current| current.unify(ty)));
    }
    match inferred {
        Some(ColumnType::Text) if all_timestamps => ColumnType::Timestamp,
        Some(ty) => ty,
        None => ColumnType::Text,
    }
}

/// Extent of every non-null geometry in the table.
#[must_use]
pub fn coordinate_extent(table: &FeatureTable) -> Option<Rect<f64>> {
    use geo_types::coord;

    let mut extent: Option<(f64, f64, f64, f64)> = None;
    for geometry in table.geometries().flatten() {
        for c in coords_of(geometry) {
            extent = Some(match extent {
                None => (c.x, c.y, c.x, c.y),
                Some((min_x, min_y, max_x, max_y)) => {
                    (min_x.min(c.x), min_y.min(c.y), max_x.max(c.x), max_y.max(c.y))
                },
            });
        }
    }
    extent.map(|(min_x, min_y, max_x, max_y)| {
        Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y })
    })
}

fn coords_of(geometry: &Geometry<f64>) -> Vec<geo_types::Coord<f64>> {
    match geometry {
        Geometry::Point(p) => vec![p.0],
        Geometry::Line(l) => vec![l.start, l.end],
        Geometry::LineString(ls) => ls.0.clone(),
        Geometry::Polygon(p) => p.exterior().0.clone(),
        Geometry::MultiPoint(mp) => mp.0.iter().map(|p| p.0).collect(),
        Geometry::MultiLineString(mls) => mls.0.iter().flat_map(|ls| ls.0.clone()).collect(),
        Geometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .flat_map(|p| p.exterior().0.clone())
            .collect(),
        Geometry::GeometryCollection(gc) => gc.0.iter().flat_map(coords_of).collect(),
        Geometry::Rect(r) => vec![r.min(), r.max()],
        Geometry::Triangle(t) => vec![t.0, t.1, t.2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, polygon};

    #[test]
    fn test_builder_pads_missing_values_with_null() {
        let mut builder = TableBuilder::new();
        builder.push_row(
            Some(point!(x: 1.0, y: 2.0).into()),
            [("name", AttributeValue::Text("A".into()))],
        );
        builder.push_row(
            Some(point!(x: 3.0, y: 4.0).into()),
            [("value", AttributeValue::Integer(7))],
        );
        let table = builder.finish(Some(WGS84));

        assert_eq!(table.len(), 2);
        assert_eq!(table.schema().names().collect::<Vec<_>>(), ["name", "value"]);
        assert_eq!(table.value(0, "value"), Some(&AttributeValue::Null));
        assert_eq!(table.value(1, "name"), Some(&AttributeValue::Null));
        assert_eq!(table.srid(), Some(WGS84));
    }

    #[test]
    fn test_builder_infers_column_types() {
        let mut builder = TableBuilder::new().with_columns(["n", "mixed", "flag", "when"]);
        builder.push_row(
            None,
            [
                ("n", AttributeValue::Integer(1)),
                ("mixed", AttributeValue::Integer(1)),
                ("flag", AttributeValue::Boolean(true)),
                ("when", AttributeValue::Text("2024-01-01T00:00:00Z".into())),
            ],
        );
        builder.push_row(
            None,
            [
                ("n", AttributeValue::Float(2.5)),
                ("mixed", AttributeValue::Text("x".into())),
                ("flag", AttributeValue::Null),
                ("when", AttributeValue::Text("2024-02-01".into())),
            ],
        );
        let table = builder.finish(None);
        let types: Vec<_> = table.schema().columns().iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            [
                ColumnType::Float,
                ColumnType::Text,
                ColumnType::Boolean,
                ColumnType::Timestamp
            ]
        );
        assert_eq!(table.value(0, "n"), Some(&AttributeValue::Float(1.0)));
        assert_eq!(table.value(0, "mixed"), Some(&AttributeValue::Text("1".into())));
    }

    #[test]
    fn test_date_text_mixed_with_numbers_stays_text() {
        let mut builder = TableBuilder::new().with_columns(["ref"]);
        builder.push_row(None, [("ref", AttributeValue::Text("2024-01-01".into()))]);
        builder.push_row(None, [("ref", AttributeValue::Integer(5))]);
        let table = builder.finish(None);

        assert_eq!(table.schema().columns()[0].column_type, ColumnType::Text);
        assert_eq!(table.value(0, "ref"), Some(&AttributeValue::Text("2024-01-01".into())));
        assert_eq!(table.value(1, "ref"), Some(&AttributeValue::Text("5".into())));
        FeatureTable::try_new(table.schema().clone(), table.features().to_vec(), None).unwrap();
    }

    #[test]
    fn test_all_null_column_is_text() {
        let mut builder = TableBuilder::new().with_columns(["empty"]);
        builder.push_row(None, Vec::<(String, AttributeValue)>::new());
        let table = builder.finish(None);
        assert_eq!(table.schema().columns()[0].column_type, ColumnType::Text);
        assert_eq!(table.features()[0].attributes, vec![AttributeValue::Null]);
    }

    #[test]
    fn test_try_new_rejects_wrong_width() {
        let schema = Schema::try_new(vec![Column::new("a", ColumnType::Integer)]).unwrap();
        let err = FeatureTable::try_new(schema, vec![Feature::new(None, vec![])], None)
            .unwrap_err();
        assert_eq!(
            err,
            TableError::WidthMismatch {
                row: 0,
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn test_try_new_rejects_wrong_type() {
        let schema = Schema::try_new(vec![Column::new("a", ColumnType::Integer)]).unwrap();
        let err = FeatureTable::try_new(
            schema,
            vec![Feature::new(None, vec![AttributeValue::Text("x".into())])],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { .. }));
    }

    #[test]
    fn test_push_checks_width() {
        let schema = Schema::try_new(vec![Column::new("a", ColumnType::Integer)]).unwrap();
        let mut table = FeatureTable::empty(schema, Some(WGS84));
        table
            .push(Feature::new(None, vec![AttributeValue::Integer(1)]))
            .unwrap();
        let err = table.push(Feature::new(None, vec![])).unwrap_err();
        assert!(matches!(err, TableError::WidthMismatch { row: 1, .. }));
        assert_eq!(table.len(), 1);
        assert_eq!(table.column_index("a"), Some(0));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Schema::try_new(vec![
            Column::new("a", ColumnType::Integer),
            Column::new("a", ColumnType::Text),
        ])
        .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".into()));
    }

    #[test]
    fn test_map_geometries_returns_new_table() {
        let mut builder = TableBuilder::new();
        builder.push_row(Some(point!(x: 1.0, y: 1.0).into()), [("id", AttributeValue::Integer(1))]);
        builder.push_row(None, [("id", AttributeValue::Integer(2))]);
        let table = builder.finish(Some(3857));

        let shifted = table
            .clone()
            .try_map_geometries(|g| match g {
                Geometry::Point(p) => Ok::<_, ()>(Geometry::Point(point!(x: p.x() + 1.0, y: p.y()))),
                other => Ok(other),
            })
            .unwrap();

        assert_eq!(shifted.features()[0].geometry, Some(point!(x: 2.0, y: 1.0).into()));
        assert_eq!(shifted.features()[1].geometry, None);
        assert_eq!(shifted.schema(), table.schema());
        assert_eq!(shifted.srid(), Some(3857));
    }

    #[test]
    fn test_extent_and_geometry_types() {
        let mut builder = TableBuilder::new();
        builder.push_row(Some(point!(x: -1.0, y: 5.0).into()), Vec::<(String, _)>::new());
        builder.push_row(
            Some(polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 2.0)].into()),
            Vec::<(String, _)>::new(),
        );
        let table = builder.finish(None);
        let extent = coordinate_extent(&table).unwrap();
        assert_eq!((extent.min().x, extent.min().y), (-1.0, 0.0));
        assert_eq!((extent.max().x, extent.max().y), (4.0, 5.0));
        assert_eq!(table.geometry_types(), ["Point", "Polygon"]);
    }
}
