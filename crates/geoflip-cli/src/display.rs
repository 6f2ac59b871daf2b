//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting geospatial data information in a human-readable format.

use tabled::{Table, Tabled};

use geoflip_core::drivers::Driver;
use geoflip_core::types::DatasetInfo;

/// Table row representation for displaying field/column information.
#[derive(Tabled)]
pub struct FieldRow {
    /// Name of the field.
    #[tabled(rename = "Field")]
    pub name: String,
    /// Inferred type of the field.
    #[tabled(rename = "Type")]
    pub data_type: String,
    /// Number of rows with a null value.
    #[tabled(rename = "Nulls")]
    pub null_count: usize,
}

/// Table row representation for displaying driver information.
#[derive(Tabled)]
pub struct DriverRow {
    /// Short identifier used in requests (e.g., `geojson`, `shp`).
    #[tabled(rename = "Short Name")]
    pub short_name: String,
    /// Full descriptive name of the driver format.
    #[tabled(rename = "Long Name")]
    pub long_name: String,
    /// Support status for reading data from this format.
    #[tabled(rename = "Read")]
    pub read: String,
    /// Support status for writing data to this format.
    #[tabled(rename = "Write")]
    pub write: String,
}

impl From<&Driver> for DriverRow {
    fn from(driver: &Driver) -> Self {
        Self {
            short_name: driver.short_name.to_string(),
            long_name: driver.long_name.to_string(),
            read: driver.capabilities.read.as_str().to_string(),
            write: driver.capabilities.write.as_str().to_string(),
        }
    }
}

fn format_srid(srid: Option<u32>) -> String {
    srid.map_or_else(|| "unknown".to_string(), |code| format!("EPSG:{code}"))
}

/// Display dataset information in a formatted table.
///
/// # Arguments
///
/// * `info` - The dataset information to display
pub fn display_dataset_info(info: &DatasetInfo) {
    println!("\nDataset: {}", info.dataset);
    println!("Driver: {} ({})", info.driver, info.driver_long_name);
    println!("Spatial reference: {}", format_srid(info.srid));
    println!("Features: {}", info.feature_count);

    if info.geometry_types.is_empty() {
        println!("Geometry types: none");
    } else {
        println!("Geometry types: {}", info.geometry_types.join(", "));
    }
    if info.null_geometries > 0 {
        println!("Features without geometry: {}", info.null_geometries);
    }
    if let Some(extent) = info.extent {
        println!(
            "Extent: ({}, {}) - ({}, {})",
            extent.min().x,
            extent.min().y,
            extent.max().x,
            extent.max().y
        );
    }

    if !info.fields.is_empty() {
        println!("\n=== Fields ===");

        let field_rows: Vec<FieldRow> = info
            .fields
            .iter()
            .map(|f| FieldRow {
                name: f.name.clone(),
                data_type: f.data_type.clone(),
                null_count: f.null_count,
            })
            .collect();

        let field_table = Table::new(field_rows).to_string();
        println!("{field_table}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoflip_core::drivers::find_driver;
    use geoflip_core::types::FieldInfo;

    #[test]
    fn test_driver_row_from_registry() {
        let row = DriverRow::from(&find_driver("shp").unwrap());
        assert_eq!(row.short_name, "shp");
        assert_eq!(row.read, "Supported");
        assert_eq!(row.write, "Supported");
    }

    #[test]
    fn test_field_table_rendering() {
        let table = Table::new([FieldRow {
            name: "population".to_string(),
            data_type: "integer".to_string(),
            null_count: 2,
        }])
        .to_string();
        assert!(table.contains("Field"));
        assert!(table.contains("population"));
        assert!(table.contains("integer"));
    }

    #[test]
    fn test_format_srid() {
        assert_eq!(format_srid(Some(28350)), "EPSG:28350");
        assert_eq!(format_srid(None), "unknown");
    }

    #[test]
    fn test_display_dataset_info_empty() {
        let info = DatasetInfo {
            dataset: "empty.geojson".to_string(),
            driver: "geojson".to_string(),
            driver_long_name: "GeoJSON (RFC 7946)".to_string(),
            srid: Some(4326),
            feature_count: 0,
            geometry_types: vec![],
            null_geometries: 0,
            extent: None,
            fields: vec![FieldInfo {
                name: "id".to_string(),
                data_type: "integer".to_string(),
                null_count: 0,
            }],
        };

        // This test ensures empty datasets are handled correctly
        display_dataset_info(&info);
    }
}
