//! Coordinate reprojection seam.
//!
//! The pipeline never calls the CRS kernel directly; it goes through a
//! [`Reprojector`] held by the [`crate::context::PipelineContext`].

use geo::MapCoords;
use geo_types::Coord;
use geoflip_core_common::FeatureTable;
use proj::Proj;

use crate::error::{Result, TransformError};

/// EPSG codes of geographic (degree based) reference systems Geoflip knows.
const GEOGRAPHIC_CODES: [u32; 7] = [4326, 4269, 4258, 4283, 7844, 4167, 4674];

/// Returns `true` when `srid` measures coordinates in degrees.
#[must_use]
pub fn is_geographic(srid: u32) -> bool {
    GEOGRAPHIC_CODES.contains(&srid)
}

/// Transforms a whole table between spatial references.
pub trait Reprojector: Send + Sync + std::fmt::Debug {
    /// Return `table` with every coordinate expressed in `to`.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::MissingSpatialReference` when the table has no
    /// srid and `TransformError::Reprojection` when the kernel fails.
    fn reproject(&self, table: FeatureTable, to: u32) -> Result<FeatureTable>;
}

fn source_srid(table: &FeatureTable) -> Result<u32> {
    table.srid().ok_or_else(|| {
        TransformError::MissingSpatialReference {
            operation: "reprojection".to_string(),
        }
        .into()
    })
}

/// Reprojection backed by PROJ.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjReprojector;

impl Reprojector for ProjReprojector {
    fn reproject(&self, table: FeatureTable, to: u32) -> Result<FeatureTable> {
        let from = source_srid(&table)?;
        if from == to {
            return Ok(table);
        }
        let reprojection_error = |message: String| TransformError::Reprojection { from, to, message };

        let proj = Proj::new_known_crs(&format!("EPSG:{from}"), &format!("EPSG:{to}"), None)
            .map_err(|err| reprojection_error(err.to_string()))?;
        log::debug!("Reprojecting {} rows from EPSG:{from} to EPSG:{to}", table.len());

        let proj = &proj;
        let table = table.try_map_geometries(|geometry| {
            geometry.try_map_coords(|c: Coord<f64>| {
                proj.convert((c.x, c.y)).map(|(x, y)| Coord { x, y })
            })
        });
        let table = table.map_err(|err| reprojection_error(err.to_string()))?;
        Ok(table.with_srid(Some(to)))
    }
}

/// Retags the table without touching coordinates.
///
/// Useful in tests and for pipelines whose input and output references match.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityReprojector;

impl Reprojector for IdentityReprojector {
    fn reproject(&self, table: FeatureTable, to: u32) -> Result<FeatureTable> {
        let from = source_srid(&table)?;
        if from != to {
            log::debug!("Identity reprojection retags EPSG:{from} as EPSG:{to}");
        }
        Ok(table.with_srid(Some(to)))
    }
}
