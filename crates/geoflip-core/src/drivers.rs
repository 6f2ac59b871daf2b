//! Driver registry for the formats Geoflip reads and writes.
//!
//! The registry lists every implemented codec together with a few formats that
//! are planned or explicitly unsupported, so the `drivers` command can show the
//! full picture. Request validation resolves format names through
//! [`resolve_input_format`] and [`resolve_output_format`].
//!
//! # Examples
//!
//! ```
//! use geoflip_core::drivers::{find_driver, get_available_drivers};
//!
//! let shp = find_driver("SHP").expect("shapefile driver should exist");
//! assert!(shp.capabilities.read.is_supported());
//!
//! for driver in get_available_drivers() {
//!     println!("{}: {}", driver.short_name, driver.long_name);
//! }
//! ```

pub use geoflip_core_common::{Driver, DriverCapabilities, Format, SupportStatus};

use crate::error::{DriverError, driver_not_found};

/// Returns the complete registry, regardless of support status.
#[must_use]
pub fn get_drivers() -> Vec<Driver> {
    use SupportStatus::{NotSupported, Planned, Supported};

    vec![
        Driver::implemented(Format::GeoJson, "GeoJSON (RFC 7946)", Supported, Supported),
        Driver::implemented(
            Format::Shapefile,
            "ESRI Shapefile (zipped .shp/.shx/.dbf/.prj)",
            Supported,
            Supported,
        ),
        Driver::implemented(Format::Dxf, "AutoCAD DXF", Supported, Supported),
        Driver::implemented(
            Format::Csv,
            "Comma Separated Value with WKT geometry",
            Supported,
            Supported,
        ),
        Driver::listed("gpkg", "GeoPackage vector", Planned, Planned),
        Driver::listed("fgb", "FlatGeobuf", Planned, Planned),
        Driver::listed("kml", "Keyhole Markup Language", NotSupported, NotSupported),
    ]
}

/// Returns drivers with at least one fully supported operation.
#[must_use]
pub fn get_available_drivers() -> Vec<Driver> {
    get_drivers()
        .into_iter()
        .filter(|d| d.capabilities.has_supported_operation())
        .collect()
}

/// Finds a driver by its short name (case-insensitive).
///
/// `shapefile` is accepted as an alias of `shp`.
#[must_use]
pub fn find_driver(name: &str) -> Option<Driver> {
    let name = name.trim();
    get_drivers().into_iter().find(|d| {
        d.short_name.eq_ignore_ascii_case(name)
            || (d.format.is_some() && d.format == Format::from_name(name))
    })
}

/// Lists drivers that fully support the requested operations.
///
/// A `false` argument leaves that operation unconstrained.
#[must_use]
pub fn list_drivers_with_capability(read: bool, write: bool) -> Vec<Driver> {
    get_drivers()
        .into_iter()
        .filter(|d| {
            let read_ok = !read || d.capabilities.read.is_supported();
            let write_ok = !write || d.capabilities.write.is_supported();
            read_ok && write_ok
        })
        .collect()
}

/// Returns all driver short names in alphabetically sorted order.
#[must_use]
pub fn get_driver_names() -> Vec<&'static str> {
    let mut names: Vec<_> = get_drivers().iter().map(|d| d.short_name).collect();
    names.sort_unstable();
    names
}

/// Resolve a request's input format name to a readable [`Format`].
///
/// # Errors
///
/// Returns `DriverError::NotFound` for unknown names and
/// `DriverError::OperationNotSupported` for drivers that cannot read.
pub fn resolve_input_format(name: &str) -> Result<Format, DriverError> {
    let driver = find_driver(name).ok_or_else(|| driver_not_found(name))?;
    driver
        .readable_format()
        .ok_or_else(|| DriverError::OperationNotSupported {
            driver: driver.short_name.to_string(),
            operation: "reading".to_string(),
        })
}

/// Resolve a request's output format name to a writable [`Format`].
///
/// # Errors
///
/// Returns `DriverError::NotFound` for unknown names and
/// `DriverError::OperationNotSupported` for drivers that cannot write.
pub fn resolve_output_format(name: &str) -> Result<Format, DriverError> {
    let driver = find_driver(name).ok_or_else(|| driver_not_found(name))?;
    driver
        .writable_format()
        .ok_or_else(|| DriverError::OperationNotSupported {
            driver: driver.short_name.to_string(),
            operation: "writing".to_string(),
        })
}
