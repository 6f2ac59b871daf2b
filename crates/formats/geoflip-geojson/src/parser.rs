//! `GeoJSON` decoding into the canonical feature table.
#![allow(clippy::result_large_err)]

use std::convert::TryInto;
use std::path::Path;

use geo_types::Geometry;
use geoflip_core_common::{
    AttributeValue, FeatureReader, FeatureTable, Format, TableBuilder, WGS84,
};
use geoflip_format_shared::{SpatialFormatReadError, SpatialFormatResult};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry as GeoJsonGeometry, JsonValue};

/// Reads `GeoJSON` `FeatureCollection` files.
///
/// `GeoJSON` coordinates are always WGS 84, so the decoded table is tagged
/// with EPSG:4326 regardless of any code supplied by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonReader;

impl FeatureReader for GeoJsonReader {
    type Error = SpatialFormatReadError;

    fn format(&self) -> Format {
        Format::GeoJson
    }

    fn read_path(&self, path: &Path, srid: Option<u32>) -> SpatialFormatResult<FeatureTable> {
        if let Some(code) = srid
            && code != WGS84
        {
            log::warn!("GeoJSON input is always EPSG:{WGS84}; ignoring requested EPSG:{code}");
        }
        let context = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source| SpatialFormatReadError::Io {
            source,
            context: Some(context.clone()),
        })?;
        parse_geojson_bytes(&bytes, context)
    }
}

/// Parse raw bytes holding a `FeatureCollection`.
///
/// # Errors
///
/// Returns a parse error if the bytes are not `GeoJSON`, the top-level object is
/// not a `FeatureCollection`, or a geometry cannot be converted.
pub fn parse_geojson_bytes(
    bytes: &[u8],
    context: impl Into<String>,
) -> SpatialFormatResult<FeatureTable> {
    let context = context.into();
    let geojson = GeoJson::from_reader(std::io::Cursor::new(bytes)).map_err(|err| {
        SpatialFormatReadError::parse(format!("Invalid GeoJSON: {err}"), context.clone())
    })?;
    geojson_to_table(geojson, &context)
}

/// Decode an inline `FeatureCollection` submitted as structured data.
///
/// # Errors
///
/// Same conditions as [`parse_geojson_bytes`].
pub fn read_value(value: JsonValue) -> SpatialFormatResult<FeatureTable> {
    let context = "inline GeoJSON";
    let geojson = GeoJson::from_json_value(value).map_err(|err| {
        SpatialFormatReadError::parse(format!("Invalid GeoJSON: {err}"), context)
    })?;
    geojson_to_table(geojson, context)
}

fn geojson_to_table(geojson: GeoJson, context: &str) -> SpatialFormatResult<FeatureTable> {
    match geojson {
        GeoJson::FeatureCollection(collection) => feature_collection_to_table(collection, context),
        GeoJson::Feature(_) => Err(not_a_collection("Feature", context)),
        GeoJson::Geometry(_) => Err(not_a_collection("Geometry", context)),
    }
}

fn not_a_collection(found: &str, context: &str) -> SpatialFormatReadError {
    SpatialFormatReadError::parse(
        format!("Invalid GeoJSON: must be a FeatureCollection, found {found}"),
        context,
    )
}

fn feature_collection_to_table(
    collection: FeatureCollection,
    context: &str,
) -> SpatialFormatResult<FeatureTable> {
    let mut builder = TableBuilder::new();
    for (idx, feature) in collection.features.into_iter().enumerate() {
        push_feature(&mut builder, feature)
            .map_err(|err| err.with_additional_context(format!("{context}, feature {idx}")))?;
    }
    Ok(builder.finish(Some(WGS84)))
}

fn push_feature(builder: &mut TableBuilder, feature: Feature) -> SpatialFormatResult<()> {
    let geometry = match feature.geometry {
        Some(geometry) => Some(convert_geometry(geometry)?),
        None => None,
    };
    let properties = feature.properties.unwrap_or_default();
    builder.push_row(
        geometry,
        properties
            .into_iter()
            .map(|(name, value)| (name, json_to_attribute(value))),
    );
    Ok(())
}

fn convert_geometry(geometry: GeoJsonGeometry) -> SpatialFormatResult<Geometry<f64>> {
    geometry
        .try_into()
        .map_err(|err| SpatialFormatReadError::Parse {
            message: format!("Failed to convert GeoJSON geometry: {err}"),
            position: None,
            context: None,
        })
}

/// Map a JSON property onto an attribute value; nested values are kept as JSON text.
pub(crate) fn json_to_attribute(value: JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(v) => AttributeValue::Boolean(v),
        JsonValue::Number(n) => match n.as_i64() {
            Some(v) => AttributeValue::Integer(v),
            None => n
                .as_f64()
                .map_or(AttributeValue::Null, AttributeValue::Float),
        },
        JsonValue::String(s) => AttributeValue::Text(s),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
            AttributeValue::Text(nested.to_string())
        },
    }
}
