//! Custom error types for `Geoflip` operations.
//!
//! Every failure is a [`GeoflipError`] wrapping a domain-specific sub-error.
//! [`GeoflipError::kind`] maps each one onto the error taxonomy the job
//! pipeline reports to clients, which also decides whether the failure is a
//! synchronous validation error or a processing error recorded on the job.

use std::fmt;
use std::path::PathBuf;

use geoflip_format_shared::{SpatialFormatReadError, SpatialFormatWriteError};
use thiserror::Error;

/// Main error type for `Geoflip` operations.
#[derive(Debug, Error)]
pub enum GeoflipError {
    /// Driver-related errors (unknown format, unsupported operation)
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Malformed or inconsistent job requests
    #[error(transparent)]
    Request(#[from] RequestError),

    /// I/O errors (file read/write, path issues)
    #[error(transparent)]
    Io(#[from] IoError),

    /// Decoding and encoding errors raised by a format codec
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Transformation and reprojection errors
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Job lookup and lifecycle errors
    #[error(transparent)]
    Job(#[from] JobError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic errors from dependencies
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error categories reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    MissingSpatialReference,
    MalformedInput,
    InvalidGeometryType,
    UnsupportedTransformation,
    NotReady,
    NotFound,
    /// The request is structurally wrong (bad JSON, missing or conflicting fields).
    InvalidRequest,
    /// A kernel, reprojection or write failure while processing a job.
    Processing,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::MissingSpatialReference => "MissingSpatialReference",
            ErrorKind::MalformedInput => "MalformedInput",
            ErrorKind::InvalidGeometryType => "InvalidGeometryType",
            ErrorKind::UnsupportedTransformation => "UnsupportedTransformation",
            ErrorKind::NotReady => "NotReady",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::Processing => "Processing",
            ErrorKind::Internal => "Internal",
        }
    }

    /// Returns `true` for errors detected synchronously at submission.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnsupportedFormat
                | ErrorKind::MissingSpatialReference
                | ErrorKind::UnsupportedTransformation
                | ErrorKind::InvalidRequest
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver-related errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Driver was not found in the registry
    #[error("Driver '{name}' not found. Available drivers: {available}")]
    NotFound {
        /// The requested driver name
        name: String,
        /// Comma-separated list of available drivers
        available: String,
    },

    /// Driver does not support the requested operation
    #[error("Driver '{driver}' does not support {operation}")]
    OperationNotSupported {
        /// The driver name
        driver: String,
        /// The operation that's not supported (e.g., "reading", "writing")
        operation: String,
    },
}

/// Errors in the shape of a job request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request is not valid JSON or does not have the expected shape
    #[error("Invalid request: {message}")]
    InvalidJson { message: String },

    /// A field required by the chosen format is missing
    #[error("field '{field}' is required for {format}")]
    MissingField { field: String, format: String },

    /// A field holds an unusable value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A file-based input was submitted without an upload
    #[error("an input file is required for {format} input")]
    MissingUpload { format: String },

    /// Both inline data and an upload were supplied, or several uploads
    #[error("{0}")]
    ConflictingInput(String),

    /// Inline output was requested for a format that always materializes a file
    #[error("`to_file=false` is only supported when `format` is 'geojson', not '{format}'")]
    InlineOutputNotSupported { format: String },
}

/// I/O related errors.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to read from a file
    #[error("Failed to read {format} file '{path}': {source}")]
    Read {
        format: String,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to write to a file
    #[error("Failed to write {format} file '{path}': {source}")]
    Write {
        format: String,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// File was not found
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },
}

/// Format decoding and encoding errors.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The format does not describe its spatial reference and none was given
    #[error("An EPSG code is required to read {format} data")]
    MissingSpatialReference { format: String },

    /// The input could not be decoded
    #[error("Malformed {format} input: {message}")]
    Malformed { format: String, message: String },

    /// Some rows could not be decoded
    #[error("Malformed {format} input: {} of {total} rows could not be parsed (rows {}): {first_error}", rows.len(), join_rows(rows))]
    InvalidRows {
        format: String,
        rows: Vec<usize>,
        total: usize,
        first_error: String,
    },

    /// The table could not be encoded
    #[error("Failed to encode {format}: {message}")]
    Encode { format: String, message: String },

    /// A geometry type the output format cannot hold
    #[error("{format} output cannot hold {geometry_type} geometries")]
    UnsupportedGeometryType {
        format: String,
        geometry_type: String,
    },
}

fn join_rows(rows: &[usize]) -> String {
    rows.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Transformation and reprojection errors.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Unknown transformation tag
    #[error("Unsupported transformation type: {tag}")]
    UnsupportedTransformation { tag: String },

    /// A transformation parameter is out of range or malformed
    #[error("Invalid {transformation} parameter: {message}")]
    InvalidParameter {
        transformation: String,
        message: String,
    },

    /// The operator cannot be applied to a geometry of this type
    #[error("{operation} requires polygon or multipolygon geometries, found {geometry_type} at row {row}")]
    InvalidGeometryType {
        operation: String,
        geometry_type: String,
        row: usize,
    },

    /// The table has no spatial reference
    #[error("The data has no spatial reference; {operation} needs one")]
    MissingSpatialReference { operation: String },

    /// Coordinates could not be transformed
    #[error("Reprojection from EPSG:{from} to EPSG:{to} failed: {message}")]
    Reprojection { from: u32, to: u32, message: String },

    /// The geometry kernel rejected the operation
    #[error("{operation} failed: {message}")]
    Kernel { operation: String, message: String },
}

/// Job lookup and lifecycle errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// No job with this id exists, or it has expired
    #[error("Job '{job_id}' not found")]
    NotFound { job_id: String },

    /// The job has not finished successfully
    #[error("Job '{job_id}' is not ready (state: {state}){}", detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
    NotReady {
        job_id: String,
        state: String,
        detail: Option<String>,
    },

    /// A file result whose artifact is gone
    #[error("Output for job '{job_id}' not found at '{path}'")]
    ResultMissing { job_id: String, path: PathBuf },

    /// The state machine forbids this transition
    #[error("Job '{job_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// The job queue has been shut down
    #[error("The job queue is closed")]
    QueueClosed,

    /// A worker failed outside the pipeline
    #[error("Worker for job '{job_id}' failed: {message}")]
    Worker { job_id: String, message: String },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption { option: String, message: String },

    /// Required option is missing
    #[error("Missing required option: {option}")]
    MissingRequired { option: String },
}

/// Type alias for Results using `GeoflipError`.
pub type Result<T> = std::result::Result<T, GeoflipError>;

impl GeoflipError {
    /// The taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Driver(_) => ErrorKind::UnsupportedFormat,
            Self::Request(_) | Self::Config(_) => ErrorKind::InvalidRequest,
            Self::Io(IoError::FileNotFound { .. }) => ErrorKind::MalformedInput,
            Self::Io(IoError::Read { .. }) => ErrorKind::MalformedInput,
            Self::Io(IoError::Write { .. }) => ErrorKind::Processing,
            Self::Format(e) => match e {
                FormatError::MissingSpatialReference { .. } => ErrorKind::MissingSpatialReference,
                FormatError::Malformed { .. } | FormatError::InvalidRows { .. } => {
                    ErrorKind::MalformedInput
                },
                FormatError::Encode { .. } | FormatError::UnsupportedGeometryType { .. } => {
                    ErrorKind::Processing
                },
            },
            Self::Transform(e) => match e {
                TransformError::UnsupportedTransformation { .. } => {
                    ErrorKind::UnsupportedTransformation
                },
                TransformError::InvalidParameter { .. } => ErrorKind::InvalidRequest,
                TransformError::InvalidGeometryType { .. } => ErrorKind::InvalidGeometryType,
                TransformError::MissingSpatialReference { .. } => {
                    ErrorKind::MissingSpatialReference
                },
                TransformError::Reprojection { .. } | TransformError::Kernel { .. } => {
                    ErrorKind::Processing
                },
            },
            Self::Job(e) => match e {
                JobError::NotFound { .. } | JobError::ResultMissing { .. } => ErrorKind::NotFound,
                JobError::NotReady { .. } => ErrorKind::NotReady,
                JobError::InvalidTransition { .. }
                | JobError::QueueClosed
                | JobError::Worker { .. } => ErrorKind::Internal,
            },
            Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Get a user-friendly error message with suggestions.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Driver(e) => e.user_message(),
            Self::Io(e) => e.user_message(),
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Other(e) => format!("Error: {e}"),
            _ => self.to_string(),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Driver(e) => e.recovery_suggestion(),
            Self::Io(IoError::FileNotFound { .. }) => {
                Some("Check that the file path is correct and the file exists.".to_string())
            },
            Self::Format(FormatError::MissingSpatialReference { .. }) => {
                Some("Supply the EPSG code of the data with 'input.epsg'.".to_string())
            },
            Self::Format(FormatError::Malformed { .. } | FormatError::InvalidRows { .. }) => {
                Some("Check the file format and ensure it's valid.".to_string())
            },
            Self::Transform(TransformError::InvalidGeometryType { .. }) => {
                Some("Buffer line or point data before applying a union.".to_string())
            },
            Self::Job(JobError::NotReady { .. }) => {
                Some("Poll the job status until it reports success.".to_string())
            },
            _ => None,
        }
    }

    /// Check if this error is potentially recoverable.
    ///
    /// Recoverable errors might be fixed by resubmitting with different parameters.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_validation() || matches!(self, Self::Job(JobError::NotReady { .. }))
    }
}

impl DriverError {
    fn user_message(&self) -> String {
        match self {
            Self::NotFound { name, available } => {
                format!(
                    "Driver '{name}' not found.\n\nAvailable drivers:\n{}",
                    available
                        .split(", ")
                        .map(|d| format!("  - {d}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            },
            Self::OperationNotSupported { driver, operation } => {
                format!("The '{driver}' driver does not support {operation}.")
            },
        }
    }

    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } => {
                Some("Run 'geoflip drivers' to see all available drivers.".to_string())
            },
            Self::OperationNotSupported { .. } => {
                Some("Try using a different driver that supports this operation.".to_string())
            },
        }
    }
}

impl IoError {
    fn user_message(&self) -> String {
        match self {
            Self::Read { format, path, .. } => {
                format!("Failed to read {} file: {}", format, path.display())
            },
            Self::Write { format, path, .. } => {
                format!("Failed to write {} file: {}", format, path.display())
            },
            Self::FileNotFound { path } => format!("File not found: {}", path.display()),
        }
    }
}

/// Map a codec read error into the pipeline taxonomy.
#[must_use]
pub fn read_error(format: &str, path: Option<&std::path::Path>, err: SpatialFormatReadError) -> GeoflipError {
    match err {
        SpatialFormatReadError::MissingSpatialReference { .. } => {
            FormatError::MissingSpatialReference {
                format: format.to_string(),
            }
            .into()
        },
        SpatialFormatReadError::Io { source, .. }
            if source.kind() == std::io::ErrorKind::NotFound && path.is_some() =>
        {
            IoError::FileNotFound {
                path: path.map(std::path::Path::to_path_buf).unwrap_or_default(),
            }
            .into()
        },
        SpatialFormatReadError::Io { source, context } => IoError::Read {
            format: format.to_string(),
            path: path
                .map(std::path::Path::to_path_buf)
                .or_else(|| context.map(PathBuf::from))
                .unwrap_or_default(),
            source: Box::new(source),
        }
        .into(),
        SpatialFormatReadError::InvalidRows {
            rows,
            total,
            first_error,
        } => FormatError::InvalidRows {
            format: format.to_string(),
            rows,
            total,
            first_error,
        }
        .into(),
        other @ (SpatialFormatReadError::Parse { .. } | SpatialFormatReadError::Other { .. }) => {
            FormatError::Malformed {
                format: format.to_string(),
                message: other.to_string(),
            }
            .into()
        },
    }
}

/// Map a codec write error into the pipeline taxonomy.
#[must_use]
pub fn write_error(format: &str, dir: &std::path::Path, err: SpatialFormatWriteError) -> GeoflipError {
    match err {
        SpatialFormatWriteError::Io { source, context } => IoError::Write {
            format: format.to_string(),
            path: context.map_or_else(|| dir.to_path_buf(), PathBuf::from),
            source: Box::new(source),
        }
        .into(),
        SpatialFormatWriteError::Encode { message } => FormatError::Encode {
            format: format.to_string(),
            message,
        }
        .into(),
        SpatialFormatWriteError::UnsupportedGeometry { geometry_type, .. } => {
            FormatError::UnsupportedGeometryType {
                format: format.to_string(),
                geometry_type,
            }
            .into()
        },
    }
}

/// Helper to create `DriverError::NotFound` with available drivers.
#[must_use]
pub fn driver_not_found(name: &str) -> DriverError {
    use crate::drivers::get_driver_names;

    DriverError::NotFound {
        name: name.to_string(),
        available: get_driver_names().join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_taxonomy() {
        let err: GeoflipError = FormatError::MissingSpatialReference {
            format: "csv".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::MissingSpatialReference);
        assert!(err.kind().is_validation());

        let err: GeoflipError = TransformError::InvalidGeometryType {
            operation: "union".into(),
            geometry_type: "Point".into(),
            row: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidGeometryType);
        assert!(!err.kind().is_validation());

        let err: GeoflipError = JobError::NotReady {
            job_id: "x".into(),
            state: "processing".into(),
            detail: None,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_invalid_rows_message_lists_indices() {
        let err = read_error(
            "csv",
            None,
            SpatialFormatReadError::InvalidRows {
                rows: vec![1, 3],
                total: 4,
                first_error: "bad WKT".into(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        let message = err.to_string();
        assert!(message.contains("2 of 4 rows"), "{message}");
        assert!(message.contains("rows 1, 3"), "{message}");
    }

    #[test]
    fn test_missing_file_maps_to_not_found_path() {
        let err = read_error(
            "geojson",
            Some(std::path::Path::new("/nope.geojson")),
            SpatialFormatReadError::Io {
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
                context: None,
            },
        );
        assert!(matches!(err, GeoflipError::Io(IoError::FileNotFound { .. })));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_driver_not_found_lists_drivers() {
        let err = driver_not_found("gml");
        let message = GeoflipError::from(err).user_message();
        assert!(message.contains("  - geojson"));
    }
}
