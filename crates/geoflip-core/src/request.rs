//! Job requests: the JSON a client submits and its validated form.
//!
//! ```json
//! {
//!   "input": {"format": "geojson"},
//!   "transformations": [{"type": "buffer", "params": {"distance": 50, "units": "meters"}}],
//!   "output": {"format": "shp", "epsg": 4326}
//! }
//! ```
//!
//! [`TransformRequest`] mirrors that shape loosely; [`TransformRequest::into_job_spec`]
//! checks it and produces the [`JobSpec`] the pipeline runs.

use std::path::PathBuf;

use geoflip_core_common::{Format, WGS84};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::drivers::{resolve_input_format, resolve_output_format};
use crate::error::{FormatError, RequestError, Result, TransformError};
use crate::transform::{BufferParams, Transformation};

/// A submitted request, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRequest {
    pub input: InputRequest,
    #[serde(default)]
    pub transformations: Vec<RawTransformation>,
    pub output: OutputRequest,
}

/// The `input` section of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRequest {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsg: Option<u32>,
    /// Name of the WKT column for CSV input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_column: Option<String>,
    /// An inline `FeatureCollection`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The `output` section of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRequest {
    pub format: String,
    #[serde(default = "default_output_epsg")]
    pub epsg: u32,
    #[serde(default = "default_to_file")]
    pub to_file: bool,
}

fn default_output_epsg() -> u32 {
    WGS84
}

fn default_to_file() -> bool {
    true
}

/// A transformation entry whose `type` has not been checked yet.
///
/// Parameters may sit under `params` or directly beside `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransformation {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl RawTransformation {
    fn parameters(&self) -> Map<String, Value> {
        let mut merged = self.rest.clone();
        if let Some(params) = &self.params {
            merged.extend(params.clone());
        }
        merged
    }
}

impl TryFrom<&RawTransformation> for Transformation {
    type Error = TransformError;

    fn try_from(raw: &RawTransformation) -> std::result::Result<Self, Self::Error> {
        match raw.tag.trim().to_ascii_lowercase().as_str() {
            Transformation::BUFFER => {
                let params: BufferParams = serde_json::from_value(Value::Object(raw.parameters()))
                    .map_err(|err| TransformError::InvalidParameter {
                        transformation: Transformation::BUFFER.to_string(),
                        message: err.to_string(),
                    })?;
                Ok(Transformation::Buffer(params))
            },
            Transformation::UNION => Ok(Transformation::Union),
            _ => Err(TransformError::UnsupportedTransformation {
                tag: raw.tag.clone(),
            }),
        }
    }
}

/// Where a job's input comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// Structured data embedded in the request.
    Inline(Value),
    /// An uploaded artifact in the job's input directory.
    File(PathBuf),
}

/// Validated input specification.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub format: Format,
    pub epsg: Option<u32>,
    pub geometry_column: Option<String>,
    pub source: InputSource,
}

/// Validated output specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub format: Format,
    pub epsg: u32,
    pub to_file: bool,
}

impl OutputSpec {
    #[must_use]
    pub fn new(format: Format, epsg: u32) -> Self {
        Self {
            format,
            epsg,
            to_file: true,
        }
    }

    #[must_use]
    pub fn inline(mut self) -> Self {
        self.to_file = false;
        self
    }
}

/// Everything a worker needs to run one job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub input: InputSpec,
    pub transformations: Vec<Transformation>,
    pub output: OutputSpec,
}

impl TransformRequest {
    /// Parse a request from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::InvalidJson` when the text does not have the request shape.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            RequestError::InvalidJson {
                message: err.to_string(),
            }
            .into()
        })
    }

    /// Parse a request from an already decoded JSON value.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TransformRequest::from_json`].
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| {
            RequestError::InvalidJson {
                message: err.to_string(),
            }
            .into()
        })
    }

    /// Validate the request and bind it to its input.
    ///
    /// `upload` is the path the uploaded artifact will be stored at, if one was
    /// submitted. Nothing is written; the caller persists the upload once the
    /// request is accepted.
    ///
    /// # Errors
    ///
    /// Returns a validation error (`UnsupportedFormat`, `MissingSpatialReference`,
    /// `UnsupportedTransformation` or `InvalidRequest`) describing the first problem.
    pub fn into_job_spec(self, upload: Option<PathBuf>) -> Result<JobSpec> {
        let input_format = resolve_input_format(&self.input.format)?;
        let output_format = resolve_output_format(&self.output.format)?;

        if input_format.requires_input_srid() && self.input.epsg.is_none() {
            return Err(FormatError::MissingSpatialReference {
                format: input_format.to_string(),
            }
            .into());
        }
        for (field, code) in [("input.epsg", self.input.epsg), ("output.epsg", Some(self.output.epsg))] {
            if code == Some(0) {
                return Err(RequestError::InvalidValue {
                    field: field.to_string(),
                    message: "EPSG codes are positive integers".to_string(),
                }
                .into());
            }
        }
        if !self.output.to_file && !output_format.supports_inline_output() {
            return Err(RequestError::InlineOutputNotSupported {
                format: output_format.to_string(),
            }
            .into());
        }
        let geometry_column = match self.input.geometry_column {
            Some(column) if input_format == Format::Csv => Some(column),
            Some(column) => {
                log::warn!("Ignoring geometry_column '{column}' for {input_format} input");
                None
            },
            None => None,
        };

        let source = match (self.input.data, upload) {
            (Some(_), Some(_)) => {
                return Err(RequestError::ConflictingInput(
                    "provide either inline 'input.data' or an input file, not both".to_string(),
                )
                .into());
            },
            (Some(data), None) if input_format.supports_inline_input() => InputSource::Inline(data),
            (Some(_), None) => {
                return Err(RequestError::ConflictingInput(format!(
                    "inline 'input.data' is only accepted for geojson input, not {input_format}"
                ))
                .into());
            },
            (None, Some(path)) => InputSource::File(path),
            (None, None) => {
                return Err(RequestError::MissingUpload {
                    format: input_format.to_string(),
                }
                .into());
            },
        };

        let transformations = self
            .transformations
            .iter()
            .map(|raw| {
                let transformation = Transformation::try_from(raw)?;
                if let Transformation::Buffer(params) = &transformation {
                    params.validate()?;
                }
                Ok(transformation)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(JobSpec {
            input: InputSpec {
                format: input_format,
                epsg: self.input.epsg,
                geometry_column,
                source,
            },
            transformations,
            output: OutputSpec {
                format: output_format,
                epsg: self.output.epsg,
                to_file: self.output.to_file,
            },
        })
    }
}
