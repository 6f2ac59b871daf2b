//! CSV writer converting a feature table to delimited text with a WKT column
//!
//! Attributes are laid out in an Arrow record batch and written with
//! `arrow-csv`; the geometry column is appended last.

use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::builder::{BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow_array::{ArrayRef, RecordBatch};
use arrow_csv::WriterBuilder;
use arrow_schema::{DataType, Field, Schema};
use geoflip_core_common::{
    AttributeValue, ColumnType, FeatureTable, FeatureWriter, Format, duration_seconds,
};
use geoflip_format_shared::{SpatialFormatWriteError, SpatialWriteResult};
use geozero::ToWkt;

use crate::geospatial::DEFAULT_GEOMETRY_COLUMN;

/// Options for CSV writing
#[derive(Debug, Clone)]
pub struct CsvWriterOptions {
    /// Column delimiter (default: b',')
    pub delimiter: u8,
    /// Whether to write header row (default: true)
    pub has_header: bool,
    /// Null value representation (default: empty string)
    pub null_value: String,
    /// Name of the WKT geometry column (default: `geom_wkt`)
    pub geometry_column: String,
}

impl Default for CsvWriterOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            null_value: String::new(),
            geometry_column: DEFAULT_GEOMETRY_COLUMN.to_string(),
        }
    }
}

impl CsvWriterOptions {
    /// Create new writer options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set column delimiter
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set whether to write header row
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Set null value representation
    #[must_use]
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = null_value.into();
        self
    }

    /// Set the WKT geometry column name
    #[must_use]
    pub fn with_geometry_column(mut self, column: impl Into<String>) -> Self {
        self.geometry_column = column.into();
        self
    }
}

/// Writes `<base_name>.csv` files.
#[derive(Debug, Clone, Default)]
pub struct CsvWriter {
    options: CsvWriterOptions,
}

impl CsvWriter {
    #[must_use]
    pub fn new(options: CsvWriterOptions) -> Self {
        Self { options }
    }
}

impl FeatureWriter for CsvWriter {
    type Error = SpatialFormatWriteError;

    fn format(&self) -> Format {
        Format::Csv
    }

    fn write_path(
        &self,
        table: &FeatureTable,
        dir: &Path,
        base_name: &str,
    ) -> SpatialWriteResult<PathBuf> {
        let path = dir.join(format!("{base_name}.{}", Format::Csv.output_extension()));
        let file = std::fs::File::create(&path).map_err(|source| SpatialFormatWriteError::Io {
            source,
            context: Some(path.display().to_string()),
        })?;
        let mut writer = std::io::BufWriter::new(file);
        write_csv(&mut writer, table, &self.options)?;
        writer.flush()?;
        Ok(path)
    }
}

/// Lay a feature table out as one Arrow record batch.
///
/// Timestamps become RFC 3339 text and durations fractional seconds.
///
/// # Errors
///
/// Returns an error if an attribute column collides with the geometry column
/// or a geometry cannot be encoded as WKT.
pub fn to_record_batch(
    table: &FeatureTable,
    geometry_column: &str,
) -> SpatialWriteResult<RecordBatch> {
    let mut fields = Vec::with_capacity(table.schema().len() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.schema().len() + 1);

    for (idx, column) in table.schema().columns().iter().enumerate() {
        if column.name == geometry_column {
            return Err(SpatialFormatWriteError::encode(format!(
                "attribute column '{}' collides with the geometry column",
                column.name
            )));
        }
        let values = table.features().iter().map(|f| &f.attributes[idx]);
        let (data_type, array) = attribute_array(column.column_type, values);
        fields.push(Field::new(&column.name, data_type, true));
        arrays.push(array);
    }

    let mut wkt = StringBuilder::with_capacity(table.len(), table.len() * 32);
    for geometry in table.geometries() {
        match geometry {
            Some(geometry) => {
                let text = geometry.to_wkt().map_err(|err| {
                    SpatialFormatWriteError::encode(format!("Failed to encode WKT: {err}"))
                })?;
                wkt.append_value(text);
            },
            None => wkt.append_null(),
        }
    }
    fields.push(Field::new(geometry_column, DataType::Utf8, true));
    arrays.push(Arc::new(wkt.finish()));

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|err| SpatialFormatWriteError::encode(err.to_string()))
}

fn attribute_array<'a>(
    column_type: ColumnType,
    values: impl Iterator<Item = &'a AttributeValue>,
) -> (DataType, ArrayRef) {
    match column_type {
        ColumnType::Integer => {
            let mut builder = Int64Builder::new();
            for value in values {
                match value {
                    AttributeValue::Integer(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            (DataType::Int64, Arc::new(builder.finish()))
        },
        ColumnType::Float | ColumnType::Duration => {
            let mut builder = Float64Builder::new();
            for value in values {
                match value {
                    AttributeValue::Float(v) => builder.append_value(*v),
                    AttributeValue::Duration(d) => builder.append_value(duration_seconds(d)),
                    _ => builder.append_null(),
                }
            }
            (DataType::Float64, Arc::new(builder.finish()))
        },
        ColumnType::Boolean => {
            let mut builder = BooleanBuilder::new();
            for value in values {
                match value {
                    AttributeValue::Boolean(v) => builder.append_value(*v),
                    _ => builder.append_null(),
                }
            }
            (DataType::Boolean, Arc::new(builder.finish()))
        },
        ColumnType::Text | ColumnType::Timestamp => {
            let mut builder = StringBuilder::new();
            for value in values {
                if value.is_null() {
                    builder.append_null();
                } else {
                    builder.append_value(value.to_string());
                }
            }
            (DataType::Utf8, Arc::new(builder.finish()))
        },
    }
}

/// Write a feature table to CSV format
///
/// # Errors
///
/// Returns an error if writing to the output fails or if CSV serialization fails
pub fn write_csv<W: IoWrite>(
    writer: &mut W,
    table: &FeatureTable,
    options: &CsvWriterOptions,
) -> SpatialWriteResult<()> {
    let batch = to_record_batch(table, &options.geometry_column)?;

    let mut builder = WriterBuilder::new()
        .with_delimiter(options.delimiter)
        .with_header(options.has_header);
    if !options.null_value.is_empty() {
        builder = builder.with_null(options.null_value.clone());
    }

    let mut csv_writer = builder.build(writer);
    csv_writer
        .write(&batch)
        .map_err(|e| SpatialFormatWriteError::encode(e.to_string()))
}

/// Write a feature table to CSV bytes
///
/// # Errors
///
/// Returns an error if CSV serialization fails
pub fn write_csv_to_bytes(
    table: &FeatureTable,
    options: &CsvWriterOptions,
) -> SpatialWriteResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, table, options)?;
    Ok(buffer)
}
