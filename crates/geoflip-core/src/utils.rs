//! Naming helpers for job artifacts.

use geoflip_core_common::Format;

/// Prefix of every generated artifact.
pub const ENGINE_NAME: &str = "geoflip";

/// File name used when an upload's name sanitizes to nothing.
const FALLBACK_FILE_NAME: &str = "upload";

/// Reduce an uploaded file name to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, and only ASCII
/// alphanumerics plus `.`, `-` and `_` are kept. Leading dots are stripped so the
/// result can never be `..` or a hidden file.
///
/// # Examples
///
/// ```
/// use geoflip_core::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
/// assert_eq!(sanitize_file_name("My Parcels (v2).zip"), "My_Parcels_v2.zip");
/// ```
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim_matches('_');
    if cleaned.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Base name (without extension) of an output artifact, e.g. `geoflip_shp_4326`.
#[must_use]
pub fn output_base_name(format: Format, srid: u32) -> String {
    format!("{ENGINE_NAME}_{}_{srid}", format.as_str())
}
