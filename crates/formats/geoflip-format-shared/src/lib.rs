//! Error and position types shared by the Geoflip format codecs.

use std::error::Error as StdError;
use std::fmt;

/// A position within a source file, such as a CSV record.
///
/// All indices are 1-based where possible to align with human expectations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePosition {
    /// Line number in the source (1-based)
    pub line: Option<u64>,
    /// Column (field) number in the source (1-based)
    pub column: Option<u64>,
    /// Logical record number reported by the parser
    pub record: Option<u64>,
    /// Name of the archive member or entity being read
    pub member: Option<String>,
}

impl SourcePosition {
    /// Returns true when the position does not contain any location metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.line.is_none() && self.column.is_none() && self.record.is_none() && self.member.is_none()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(member) = &self.member {
            parts.push(format!("member '{member}'"));
        }
        if let Some(line) = self.line {
            parts.push(format!("line {line}"));
        }
        if let Some(column) = self.column {
            parts.push(format!("column {column}"));
        }
        if let Some(record) = self.record {
            parts.push(format!("record {record}"));
        }

        if parts.is_empty() {
            write!(f, "unknown position")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors that can occur when decoding a spatial format into a feature table.
#[derive(Debug)]
pub enum SpatialFormatReadError {
    /// An underlying I/O failure occurred.
    Io {
        /// The originating error.
        source: std::io::Error,
        /// Optional context describing what was being read.
        context: Option<String>,
    },
    /// Parsing failed for the input source.
    Parse {
        /// Human readable description of the failure.
        message: String,
        /// Optional position describing where the failure occurred.
        position: Option<SourcePosition>,
        /// Optional context describing what was being read.
        context: Option<String>,
    },
    /// Individual rows could not be decoded. Row indices are 0-based data rows.
    InvalidRows {
        /// Indices of the rows that failed.
        rows: Vec<usize>,
        /// Total number of data rows in the source.
        total: usize,
        /// Description of the first failure, for diagnostics.
        first_error: String,
    },
    /// The format carries no spatial reference and none was supplied.
    MissingSpatialReference {
        /// The format being read.
        format: String,
    },
    /// Other error type not classified above.
    Other {
        /// Human readable description of the failure.
        message: String,
    },
}

impl SpatialFormatReadError {
    fn fmt_context(context: Option<&str>) -> String {
        context
            .map(|c| format!(" while reading {c}"))
            .unwrap_or_default()
    }

    fn fmt_position(position: Option<&SourcePosition>) -> String {
        position.map(|pos| format!(" at {pos}")).unwrap_or_default()
    }

    /// Shorthand for a parse error without position information.
    #[must_use]
    pub fn parse(message: impl Into<String>, context: impl Into<String>) -> Self {
        SpatialFormatReadError::Parse {
            message: message.into(),
            position: None,
            context: Some(context.into()),
        }
    }

    /// Attach additional context to the error, returning the updated error.
    #[must_use]
    pub fn with_additional_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        match &mut self {
            SpatialFormatReadError::Io {
                context: existing, ..
            }
            | SpatialFormatReadError::Parse {
                context: existing, ..
            } => match existing {
                Some(existing) if !existing.is_empty() => {
                    existing.push_str("; ");
                    existing.push_str(&context);
                },
                _ => *existing = Some(context),
            },
            SpatialFormatReadError::Other { message }
            | SpatialFormatReadError::InvalidRows {
                first_error: message,
                ..
            } => {
                message.push_str(" (");
                message.push_str(&context);
                message.push(')');
            },
            SpatialFormatReadError::MissingSpatialReference { .. } => {},
        }
        self
    }
}

impl fmt::Display for SpatialFormatReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialFormatReadError::Io { source, context } => {
                write!(
                    f,
                    "I/O error{}: {source}",
                    Self::fmt_context(context.as_deref())
                )
            },
            SpatialFormatReadError::Parse {
                message,
                position,
                context,
            } => write!(
                f,
                "Parse error{}{}: {message}",
                Self::fmt_context(context.as_deref()),
                Self::fmt_position(position.as_ref())
            ),
            SpatialFormatReadError::InvalidRows {
                rows,
                total,
                first_error,
            } => {
                let listed = rows
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "{} of {total} rows could not be decoded (rows {listed}): {first_error}",
                    rows.len()
                )
            },
            SpatialFormatReadError::MissingSpatialReference { format } => write!(
                f,
                "{format} input does not describe its spatial reference; an EPSG code is required"
            ),
            SpatialFormatReadError::Other { message } => f.write_str(message),
        }
    }
}

impl StdError for SpatialFormatReadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SpatialFormatReadError::Io { source, .. } => Some(source),
            SpatialFormatReadError::Parse { .. }
            | SpatialFormatReadError::InvalidRows { .. }
            | SpatialFormatReadError::MissingSpatialReference { .. }
            | SpatialFormatReadError::Other { .. } => None,
        }
    }
}

impl From<std::io::Error> for SpatialFormatReadError {
    fn from(source: std::io::Error) -> Self {
        SpatialFormatReadError::Io {
            source,
            context: None,
        }
    }
}

/// Errors that can occur when encoding a feature table into a spatial format.
#[derive(Debug)]
pub enum SpatialFormatWriteError {
    /// An underlying I/O failure occurred.
    Io {
        /// The originating error.
        source: std::io::Error,
        /// Optional context describing what was being written.
        context: Option<String>,
    },
    /// The codec rejected the data.
    Encode {
        /// Human readable description of the failure.
        message: String,
    },
    /// The format cannot represent a geometry in the table.
    UnsupportedGeometry {
        /// The geometry type name.
        geometry_type: String,
        /// The format being written.
        format: String,
    },
}

impl SpatialFormatWriteError {
    /// Shorthand for an encode error.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        SpatialFormatWriteError::Encode {
            message: message.into(),
        }
    }
}

impl fmt::Display for SpatialFormatWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialFormatWriteError::Io { source, context } => write!(
                f,
                "I/O error{}: {source}",
                context
                    .as_deref()
                    .map(|c| format!(" while writing {c}"))
                    .unwrap_or_default()
            ),
            SpatialFormatWriteError::Encode { message } => write!(f, "Encode error: {message}"),
            SpatialFormatWriteError::UnsupportedGeometry {
                geometry_type,
                format,
            } => write!(f, "{format} cannot represent {geometry_type} geometries"),
        }
    }
}

impl StdError for SpatialFormatWriteError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SpatialFormatWriteError::Io { source, .. } => Some(source),
            SpatialFormatWriteError::Encode { .. }
            | SpatialFormatWriteError::UnsupportedGeometry { .. } => None,
        }
    }
}

impl From<std::io::Error> for SpatialFormatWriteError {
    fn from(source: std::io::Error) -> Self {
        SpatialFormatWriteError::Io {
            source,
            context: None,
        }
    }
}

/// Result type alias that uses [`SpatialFormatReadError`].
pub type SpatialFormatResult<T> = Result<T, SpatialFormatReadError>;

/// Result type alias that uses [`SpatialFormatWriteError`].
pub type SpatialWriteResult<T> = Result<T, SpatialFormatWriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_source_position() {
        let pos = SourcePosition {
            line: Some(10),
            column: Some(3),
            ..SourcePosition::default()
        };

        assert_eq!(pos.to_string(), "line 10, column 3");
    }

    #[test]
    fn display_parse_error_with_context() {
        let error = SpatialFormatReadError::Parse {
            message: "unexpected delimiter".to_string(),
            position: Some(SourcePosition {
                line: Some(5),
                column: Some(7),
                ..Default::default()
            }),
            context: Some("parcels.csv".to_string()),
        };

        assert_eq!(
            error.to_string(),
            "Parse error while reading parcels.csv at line 5, column 7: unexpected delimiter"
        );
    }

    #[test]
    fn display_invalid_rows_lists_indices() {
        let error = SpatialFormatReadError::InvalidRows {
            rows: vec![1, 4],
            total: 6,
            first_error: "bad WKT".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "2 of 6 rows could not be decoded (rows 1, 4): bad WKT"
        );
    }

    #[test]
    fn additional_context_is_appended() {
        let error = SpatialFormatReadError::parse("truncated", "a.dxf")
            .with_additional_context("layer 0");
        assert!(error.to_string().contains("a.dxf; layer 0"));
    }
}
