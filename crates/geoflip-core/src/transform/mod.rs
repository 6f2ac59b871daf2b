//! Transformation engine.
//!
//! A job carries an ordered list of [`Transformation`]s. The engine threads the
//! feature table through them in order; every stage consumes the table and
//! returns a new one.

mod buffer;
mod union;

pub use buffer::{DEFAULT_SIMPLIFY_RATIO, apply_buffer, utm_zone_srid};
pub use union::apply_union;

use std::fmt;

use geoflip_core_common::FeatureTable;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};
use crate::reproject::Reprojector;

/// Unit of a buffer distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Feet,
    Miles,
}

impl DistanceUnit {
    /// Length of one unit in meters.
    #[must_use]
    pub const fn meters(&self) -> f64 {
        match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Kilometers => 1000.0,
            DistanceUnit::Feet => 0.3048,
            DistanceUnit::Miles => 1609.344,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DistanceUnit::Meters => "meters",
            DistanceUnit::Kilometers => "kilometers",
            DistanceUnit::Feet => "feet",
            DistanceUnit::Miles => "miles",
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a buffer stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BufferParams {
    pub distance: f64,
    pub units: DistanceUnit,
    /// Simplification tolerance in the table's planar unit; defaults to a
    /// fraction of the distance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplify_tolerance: Option<f64>,
}

impl BufferParams {
    #[must_use]
    pub fn new(distance: f64, units: DistanceUnit) -> Self {
        Self {
            distance,
            units,
            simplify_tolerance: None,
        }
    }

    #[must_use]
    pub fn with_simplify_tolerance(mut self, tolerance: f64) -> Self {
        self.simplify_tolerance = Some(tolerance);
        self
    }

    /// The distance converted to meters.
    #[must_use]
    pub fn distance_in_meters(&self) -> f64 {
        self.distance * self.units.meters()
    }

    /// The tolerance used to simplify buffered geometries.
    #[must_use]
    pub fn effective_tolerance(&self) -> f64 {
        self.simplify_tolerance
            .unwrap_or_else(|| self.distance_in_meters().abs() * DEFAULT_SIMPLIFY_RATIO)
    }

    /// Reject non-finite distances and negative or non-finite tolerances.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::InvalidParameter` describing the offending value.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| TransformError::InvalidParameter {
            transformation: Transformation::BUFFER.to_string(),
            message,
        };
        if !self.distance.is_finite() {
            return Err(invalid(format!("distance must be a finite number, got {}", self.distance)).into());
        }
        if let Some(tolerance) = self.simplify_tolerance
            && (!tolerance.is_finite() || tolerance < 0.0)
        {
            return Err(invalid(format!(
                "simplify_tolerance must be a non-negative number, got {tolerance}"
            ))
            .into());
        }
        Ok(())
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformation {
    Buffer(BufferParams),
    Union,
}

impl Transformation {
    pub const BUFFER: &'static str = "buffer";
    pub const UNION: &'static str = "union";

    /// The stage name reported in `transformations_applied`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Transformation::Buffer(_) => Self::BUFFER,
            Transformation::Union => Self::UNION,
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transformation::Buffer(params) => {
                write!(f, "buffer({} {})", params.distance, params.units)
            },
            Transformation::Union => f.write_str(Self::UNION),
        }
    }
}

/// Apply `transformations` in order.
///
/// Returns the final table and the names of the stages applied.
///
/// # Errors
///
/// Propagates the first stage failure.
pub fn apply_transformations(
    table: FeatureTable,
    transformations: &[Transformation],
    reprojector: &dyn Reprojector,
) -> Result<(FeatureTable, Vec<&'static str>)> {
    let mut table = table;
    let mut applied = Vec::with_capacity(transformations.len());
    for transformation in transformations {
        log::info!("Applying {transformation} to {} rows", table.len());
        table = match transformation {
            Transformation::Buffer(params) => apply_buffer(table, params, reprojector)?,
            Transformation::Union => apply_union(table)?,
        };
        applied.push(transformation.name());
    }
    Ok((table, applied))
}
