//! Geospatial data parsing for CSV files
//!
//! This module decodes delimited text with a Well-Known Text (WKT) geometry
//! column into a feature table. Every other column becomes an attribute whose
//! type is inferred from the cell text.

use std::path::Path;

use csv::StringRecord;
use geo_types::Geometry;
use geoflip_core_common::{AttributeValue, FeatureReader, FeatureTable, Format, TableBuilder};
use geoflip_format_shared::{SourcePosition, SpatialFormatReadError, SpatialFormatResult};
use geozero::ToGeo;
use geozero::wkt::Wkt;

/// Default name of the WKT geometry column.
pub const DEFAULT_GEOMETRY_COLUMN: &str = "geom_wkt";

/// Options for CSV reading
#[derive(Debug, Clone)]
pub struct CsvReaderOptions {
    /// Column holding WKT geometries (default: `geom_wkt`)
    pub geometry_column: String,
    /// Column delimiter (default: b',')
    pub delimiter: u8,
}

impl Default for CsvReaderOptions {
    fn default() -> Self {
        Self {
            geometry_column: DEFAULT_GEOMETRY_COLUMN.to_string(),
            delimiter: b',',
        }
    }
}

impl CsvReaderOptions {
    /// Create new reader options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WKT geometry column
    #[must_use]
    pub fn with_geometry_column(mut self, column: impl Into<String>) -> Self {
        self.geometry_column = column.into();
        self
    }

    /// Set column delimiter
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Reads CSV files with a WKT geometry column.
///
/// CSV carries no spatial reference, so the caller must supply one.
#[derive(Debug, Clone, Default)]
pub struct CsvReader {
    options: CsvReaderOptions,
}

impl CsvReader {
    #[must_use]
    pub fn new(options: CsvReaderOptions) -> Self {
        Self { options }
    }
}

impl FeatureReader for CsvReader {
    type Error = SpatialFormatReadError;

    fn format(&self) -> Format {
        Format::Csv
    }

    fn read_path(&self, path: &Path, srid: Option<u32>) -> SpatialFormatResult<FeatureTable> {
        let Some(srid) = srid else {
            return Err(SpatialFormatReadError::MissingSpatialReference {
                format: Format::Csv.to_string(),
            });
        };
        let context = path.display().to_string();
        let reader = csv::ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .has_headers(true)
            .from_path(path)
            .map_err(|err| csv_error(err, &context))?;
        read_records(reader, &self.options, srid, &context)
    }
}

/// Decode CSV data from any reader.
///
/// # Errors
///
/// Returns an error if the geometry column is missing, a record is malformed,
/// or any row holds unparsable WKT. Rows failing WKT decoding are reported by
/// their 0-based data-row index.
pub fn read_csv<R: std::io::Read>(
    input: R,
    options: &CsvReaderOptions,
    srid: u32,
    context: &str,
) -> SpatialFormatResult<FeatureTable> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(true)
        .from_reader(input);
    read_records(reader, options, srid, context)
}

fn read_records<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    options: &CsvReaderOptions,
    srid: u32,
    context: &str,
) -> SpatialFormatResult<FeatureTable> {
    let headers = reader
        .headers()
        .map_err(|err| csv_error(err, context))?
        .clone();
    let geometry_idx = find_geometry_column(&headers, &options.geometry_column).ok_or_else(|| {
        SpatialFormatReadError::parse(
            format!(
                "geometry column '{}' not found (columns: {})",
                options.geometry_column,
                headers.iter().collect::<Vec<_>>().join(", ")
            ),
            context,
        )
    })?;
    let attribute_names: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != geometry_idx)
        .map(|(idx, name)| (idx, name.to_string()))
        .collect();

    let mut builder =
        TableBuilder::new().with_columns(attribute_names.iter().map(|(_, name)| name.clone()));
    let mut failed_rows = Vec::new();
    let mut first_error = None;
    let mut total = 0usize;

    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|err| csv_error(err, context))?;
        total += 1;

        let geometry = match parse_wkt(record.get(geometry_idx).unwrap_or_default()) {
            Ok(geometry) => geometry,
            Err(message) => {
                log::debug!("Row {row} of {context} has unparsable WKT: {message}");
                failed_rows.push(row);
                first_error.get_or_insert(message);
                continue;
            },
        };

        builder.push_row(
            geometry,
            attribute_names.iter().map(|(idx, name)| {
                (
                    name.clone(),
                    AttributeValue::parse_text(record.get(*idx).unwrap_or_default()),
                )
            }),
        );
    }

    if !failed_rows.is_empty() {
        let first_error = first_error.unwrap_or_default();
        if failed_rows.len() == total {
            return Err(SpatialFormatReadError::parse(
                format!("no row contained a parsable geometry: {first_error}"),
                context,
            ));
        }
        return Err(SpatialFormatReadError::InvalidRows {
            rows: failed_rows,
            total,
            first_error,
        }
        .with_additional_context(context));
    }

    Ok(builder.finish(Some(srid)))
}

fn find_geometry_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .or_else(|| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name)))
}

/// Parse one WKT cell; blank cells are null geometries.
pub(crate) fn parse_wkt(raw: &str) -> Result<Option<Geometry<f64>>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Wkt(trimmed)
        .to_geo()
        .map(Some)
        .map_err(|err| format!("Failed to decode WKT geometry '{}': {err}", abbreviate(trimmed)))
}

fn abbreviate(text: &str) -> String {
    const LIMIT: usize = 40;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{head}...")
    }
}

fn csv_error(err: csv::Error, context: &str) -> SpatialFormatReadError {
    let position = err.position().map(|pos| SourcePosition {
        line: Some(pos.line()),
        record: Some(pos.record()),
        ..SourcePosition::default()
    });
    match err.into_kind() {
        csv::ErrorKind::Io(source) => SpatialFormatReadError::Io {
            source,
            context: Some(context.to_string()),
        },
        kind => SpatialFormatReadError::Parse {
            message: format!("{kind:?}"),
            position,
            context: Some(context.to_string()),
        },
    }
}
