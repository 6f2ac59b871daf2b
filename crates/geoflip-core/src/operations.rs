//! One-shot dataset operations outside the job pipeline.

use std::path::Path;

use geoflip_core_common::FeatureTable;
use log::info;

use crate::adapters::decode;
use crate::drivers::{find_driver, resolve_input_format};
use crate::error::{FormatError, Result};
use crate::request::{InputSource, InputSpec};
use crate::types::{DatasetInfo, FieldInfo};

/// Decode a dataset and summarize it.
///
/// # Arguments
///
/// * `dataset` - Path to the dataset file (a `.zip` bundle for shapefiles).
/// * `format` - Driver name, e.g. `"csv"` or `"shp"`.
/// * `epsg` - Spatial reference of the data; required for CSV and DXF.
/// * `geometry_column` - WKT column name for CSV input.
///
/// # Errors
///
/// Returns an error if the format cannot be read, the spatial reference is
/// missing where required, or decoding fails.
pub fn describe(
    dataset: &Path,
    format: &str,
    epsg: Option<u32>,
    geometry_column: Option<String>,
) -> Result<DatasetInfo> {
    let resolved = resolve_input_format(format)?;
    if resolved.requires_input_srid() && epsg.is_none() {
        return Err(FormatError::MissingSpatialReference {
            format: resolved.to_string(),
        }
        .into());
    }
    info!("Describing {} as {resolved}", dataset.display());

    let spec = InputSpec {
        format: resolved,
        epsg,
        geometry_column,
        source: InputSource::File(dataset.to_path_buf()),
    };
    let table = decode(&spec, None)?;

    let (driver, driver_long_name) = find_driver(format).map_or_else(
        || (resolved.to_string(), resolved.to_string()),
        |d| (d.short_name.to_string(), d.long_name.to_string()),
    );

    Ok(DatasetInfo {
        dataset: dataset.display().to_string(),
        driver,
        driver_long_name,
        srid: table.srid(),
        feature_count: table.len(),
        geometry_types: table.geometry_types().into_iter().map(str::to_string).collect(),
        null_geometries: table.geometries().filter(Option::is_none).count(),
        extent: table.bounding_rect(),
        fields: field_info(&table),
    })
}

fn field_info(table: &FeatureTable) -> Vec<FieldInfo> {
    table
        .schema()
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| FieldInfo {
            name: column.name.clone(),
            data_type: column.column_type.to_string(),
            null_count: table
                .features()
                .iter()
                .filter(|feature| feature.attributes.get(index).is_none_or(|value| value.is_null()))
                .count(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;

    fn create_test_csv(path: &Path) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        writeln!(file, "id,name,geom_wkt")?;
        writeln!(file, "1,Alice,POINT (1 2)")?;
        writeln!(file, "2,,LINESTRING (0 0, 3 4)")?;
        writeln!(file, "3,Charlie,")?;
        Ok(())
    }

    #[test]
    fn test_describe_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("input.csv");
        create_test_csv(&path).unwrap();

        let info = describe(&path, "CSV", Some(28350), None).unwrap();
        assert_eq!(info.driver, "csv");
        assert_eq!(info.srid, Some(28350));
        assert_eq!(info.feature_count, 3);
        assert_eq!(info.geometry_types, ["Point", "LineString"]);
        assert_eq!(info.null_geometries, 1);

        let extent = info.extent.unwrap();
        assert_eq!(extent.min().x, 0.0);
        assert_eq!(extent.max().y, 4.0);

        let names: Vec<_> = info.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "name"]);
        assert_eq!(info.fields[0].data_type, "integer");
        assert_eq!(info.fields[1].null_count, 1);
    }

    #[test]
    fn test_describe_requires_epsg_for_csv() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("input.csv");
        create_test_csv(&path).unwrap();
        let err = describe(&path, "csv", None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingSpatialReference);
    }

    #[test]
    fn test_describe_unknown_driver() {
        let err = describe(Path::new("whatever.xyz"), "xyz", None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }
}
