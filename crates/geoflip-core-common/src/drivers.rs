//! Format and driver descriptors.
//!
//! A [`Format`] names one of the codecs Geoflip implements and carries the
//! properties the job pipeline needs to validate a request: whether the format
//! describes its own spatial reference, whether it can travel inline, and what
//! file extension its artifacts use. A [`Driver`] is the registry entry that
//! pairs a format with its support status.

use std::fmt;

use crate::table::WGS84;

/// A format Geoflip can decode and encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// `GeoJSON` `FeatureCollection`s.
    GeoJson,
    /// Zipped ESRI Shapefile (`.shp` + sidecars).
    Shapefile,
    /// AutoCAD Drawing Exchange Format.
    Dxf,
    /// Comma separated values with a WKT geometry column.
    Csv,
}

impl Format {
    /// All formats, in registry order.
    pub const ALL: [Format; 4] = [Format::GeoJson, Format::Shapefile, Format::Dxf, Format::Csv];

    /// The short name used in job requests (e.g. `"shp"`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Format::GeoJson => "geojson",
            Format::Shapefile => "shp",
            Format::Dxf => "dxf",
            Format::Csv => "csv",
        }
    }

    /// Resolve a request format name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Format> {
        let name = name.trim();
        Format::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name))
            .or_else(|| name.eq_ignore_ascii_case("shapefile").then_some(Format::Shapefile))
    }

    /// Extension of the artifact produced when encoding to this format.
    #[must_use]
    pub const fn output_extension(&self) -> &'static str {
        match self {
            Format::GeoJson => "geojson",
            Format::Shapefile => "zip",
            Format::Dxf => "dxf",
            Format::Csv => "csv",
        }
    }

    /// Returns `true` when decoding needs an explicit EPSG code.
    #[must_use]
    pub const fn requires_input_srid(&self) -> bool {
        matches!(self, Format::Dxf | Format::Csv)
    }

    /// Returns `true` when the format can be submitted as embedded JSON.
    #[must_use]
    pub const fn supports_inline_input(&self) -> bool {
        matches!(self, Format::GeoJson)
    }

    /// Returns `true` when results can be returned as structured data.
    #[must_use]
    pub const fn supports_inline_output(&self) -> bool {
        matches!(self, Format::GeoJson)
    }

    /// The spatial reference the format always encodes in, if any.
    #[must_use]
    pub const fn fixed_srid(&self) -> Option<u32> {
        match self {
            Format::GeoJson => Some(WGS84),
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Support status for a specific driver operation.
///
/// Indicates whether a driver operation (info, read, or write) is currently supported,
/// planned for future implementation, or not supported at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    /// The feature is fully supported and implemented.
    Supported,
    /// The feature is not supported by the driver.
    NotSupported,
    /// The feature is planned for future implementation.
    Planned,
}

impl SupportStatus {
    /// Returns `true` if the operation is fully supported and implemented.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, SupportStatus::Supported)
    }

    /// Returns `true` if the operation is supported or planned (i.e., not explicitly unsupported).
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self, SupportStatus::NotSupported)
    }

    /// Returns the string representation of this support status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SupportStatus::Supported => "Supported",
            SupportStatus::NotSupported => "Not Supported",
            SupportStatus::Planned => "Planned",
        }
    }
}

/// Capabilities supported by a format driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverCapabilities {
    /// Support status for decoding this format into a feature table.
    pub read: SupportStatus,
    /// Support status for encoding a feature table into this format.
    pub write: SupportStatus,
}

impl DriverCapabilities {
    /// Returns `true` if at least one operation is supported or planned.
    #[must_use]
    pub fn has_any_support(&self) -> bool {
        self.read.is_available() || self.write.is_available()
    }

    /// Returns `true` if at least one operation is fully supported and implemented.
    #[must_use]
    pub fn has_supported_operation(&self) -> bool {
        self.read.is_supported() || self.write.is_supported()
    }
}

/// Format driver definition.
///
/// A driver has a short name (used in job requests and the CLI), a descriptive
/// long name, the implemented [`Format`] if there is one, and its capabilities.
#[derive(Debug, Clone)]
pub struct Driver {
    /// Short name used in requests (e.g., `"geojson"`).
    pub short_name: &'static str,
    /// Long descriptive name for display purposes.
    pub long_name: &'static str,
    /// The codec behind this driver; `None` for drivers that are only listed.
    pub format: Option<Format>,
    /// Operations supported by this driver.
    pub capabilities: DriverCapabilities,
}

impl Driver {
    /// Creates a driver backed by an implemented format.
    #[must_use]
    pub const fn implemented(
        format: Format,
        long_name: &'static str,
        read: SupportStatus,
        write: SupportStatus,
    ) -> Self {
        Self {
            short_name: format.as_str(),
            long_name,
            format: Some(format),
            capabilities: DriverCapabilities { read, write },
        }
    }

    /// Creates a registry entry for a format without a codec.
    #[must_use]
    pub const fn listed(
        short_name: &'static str,
        long_name: &'static str,
        read: SupportStatus,
        write: SupportStatus,
    ) -> Self {
        Self {
            short_name,
            long_name,
            format: None,
            capabilities: DriverCapabilities { read, write },
        }
    }

    /// The format if this driver can read.
    #[must_use]
    pub fn readable_format(&self) -> Option<Format> {
        self.format.filter(|_| self.capabilities.read.is_supported())
    }

    /// The format if this driver can write.
    #[must_use]
    pub fn writable_format(&self) -> Option<Format> {
        self.format.filter(|_| self.capabilities.write.is_supported())
    }
}
