//! `GeoJSON` writer turning a feature table into a `FeatureCollection`.

use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use geoflip_core_common::{
    AttributeValue, FeatureTable, FeatureWriter, Format, WGS84, duration_seconds,
};
use geoflip_format_shared::{SpatialFormatWriteError, SpatialWriteResult};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};

/// Options for `GeoJSON` writing
#[derive(Debug, Clone, Default)]
pub struct GeoJsonWriterOptions {
    /// Indent the output (default: false)
    pub pretty: bool,
}

impl GeoJsonWriterOptions {
    /// Create new writer options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to indent the output
    #[must_use]
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Writes `<base_name>.geojson` files.
#[derive(Debug, Clone, Default)]
pub struct GeoJsonWriter {
    options: GeoJsonWriterOptions,
}

impl GeoJsonWriter {
    #[must_use]
    pub fn new(options: GeoJsonWriterOptions) -> Self {
        Self { options }
    }
}

impl FeatureWriter for GeoJsonWriter {
    type Error = SpatialFormatWriteError;

    fn format(&self) -> Format {
        Format::GeoJson
    }

    fn write_path(
        &self,
        table: &FeatureTable,
        dir: &Path,
        base_name: &str,
    ) -> SpatialWriteResult<PathBuf> {
        let path = dir.join(format!("{base_name}.{}", Format::GeoJson.output_extension()));
        let file = std::fs::File::create(&path).map_err(|source| SpatialFormatWriteError::Io {
            source,
            context: Some(path.display().to_string()),
        })?;
        let mut writer = std::io::BufWriter::new(file);
        write_geojson(&mut writer, table, &self.options)?;
        writer.flush()?;
        Ok(path)
    }
}

/// Build the `FeatureCollection` for a table.
#[must_use]
pub fn to_feature_collection(table: &FeatureTable) -> FeatureCollection {
    if let Some(srid) = table.srid()
        && srid != WGS84
    {
        log::warn!("Writing GeoJSON from a table in EPSG:{srid}; coordinates are not WGS 84");
    }

    let names: Vec<&str> = table.schema().names().collect();
    let features = table
        .features()
        .iter()
        .map(|feature| {
            let properties: JsonObject = names
                .iter()
                .zip(&feature.attributes)
                .map(|(name, value)| ((*name).to_string(), attribute_to_json(value)))
                .collect();
            Feature {
                bbox: None,
                geometry: feature.geometry.as_ref().map(geojson::Geometry::from),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Serialise a table as inline structured data.
///
/// # Errors
///
/// Returns an encode error if serialisation fails.
pub fn write_value(table: &FeatureTable) -> SpatialWriteResult<JsonValue> {
    serde_json::to_value(to_feature_collection(table))
        .map_err(|err| SpatialFormatWriteError::encode(format!("GeoJSON serialisation: {err}")))
}

/// Write a table as a `FeatureCollection` document.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn write_geojson<W: IoWrite>(
    writer: &mut W,
    table: &FeatureTable,
    options: &GeoJsonWriterOptions,
) -> SpatialWriteResult<()> {
    let collection = to_feature_collection(table);
    let result = if options.pretty {
        serde_json::to_writer_pretty(writer, &collection)
    } else {
        serde_json::to_writer(writer, &collection)
    };
    result.map_err(|err| SpatialFormatWriteError::encode(format!("GeoJSON serialisation: {err}")))
}

fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Integer(v) => JsonValue::from(*v),
        AttributeValue::Float(v) => float_to_json(*v),
        AttributeValue::Boolean(v) => JsonValue::Bool(*v),
        AttributeValue::Text(v) => JsonValue::String(v.clone()),
        AttributeValue::Timestamp(_) => JsonValue::String(value.to_string()),
        AttributeValue::Duration(d) => float_to_json(duration_seconds(d)),
    }
}

fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v).map_or(JsonValue::Null, JsonValue::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use geo_types::point;
    use geoflip_core_common::TableBuilder;

    fn sample_table() -> FeatureTable {
        let mut builder = TableBuilder::new();
        builder.push_row(
            Some(point!(x: 115.86, y: -31.95).into()),
            [
                ("name", AttributeValue::Text("Perth".into())),
                ("pop", AttributeValue::Integer(2_100_000)),
                ("wait", AttributeValue::Duration(TimeDelta::seconds(90))),
            ],
        );
        builder.push_row(None, [("name", AttributeValue::Text("Nowhere".into()))]);
        builder.finish(Some(WGS84))
    }

    #[test]
    fn test_feature_collection_properties() {
        let value = write_value(&sample_table()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        let first = &value["features"][0];
        assert_eq!(first["geometry"]["type"], "Point");
        assert_eq!(first["properties"]["name"], "Perth");
        assert_eq!(first["properties"]["pop"], 2_100_000);
        assert_eq!(first["properties"]["wait"], 90.0);

        let second = &value["features"][1];
        assert!(second["geometry"].is_null());
        assert!(second["properties"]["pop"].is_null());
    }

    #[test]
    fn test_pretty_output_is_indented() {
        let mut buffer = Vec::new();
        write_geojson(
            &mut buffer,
            &sample_table(),
            &GeoJsonWriterOptions::new().with_pretty(true),
        )
        .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("\n  "));
    }

    #[test]
    fn test_nan_becomes_null() {
        assert!(float_to_json(f64::NAN).is_null());
    }
}
