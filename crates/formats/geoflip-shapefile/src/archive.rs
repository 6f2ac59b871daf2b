//! Zip archive handling for Shapefile bundles.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use geoflip_format_shared::{SpatialFormatReadError, SpatialFormatResult, SpatialFormatWriteError};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Why no single primary file could be selected from an archive listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryFileError {
    /// No entry carries the wanted extension.
    Missing,
    /// Several entries carry the wanted extension.
    Ambiguous(Vec<PathBuf>),
}

impl std::fmt::Display for PrimaryFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimaryFileError::Missing => write!(f, "archive contains no .shp file"),
            PrimaryFileError::Ambiguous(candidates) => {
                let names = candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "archive contains several .shp files: {names}")
            },
        }
    }
}

impl std::error::Error for PrimaryFileError {}

/// Select the single `.shp` entry of an extracted archive listing.
///
/// Extensions match case-insensitively; macOS resource-fork entries
/// (`__MACOSX/`, `._*`) are never candidates.
///
/// # Errors
///
/// Returns [`PrimaryFileError::Missing`] when there is no candidate and
/// [`PrimaryFileError::Ambiguous`] when there is more than one.
pub fn find_primary_file(listing: &[PathBuf]) -> Result<PathBuf, PrimaryFileError> {
    let mut candidates: Vec<PathBuf> = listing
        .iter()
        .filter(|path| !is_resource_fork(path))
        .filter(|path| has_extension(path, "shp"))
        .cloned()
        .collect();
    match candidates.len() {
        0 => Err(PrimaryFileError::Missing),
        1 => Ok(candidates.remove(0)),
        _ => Err(PrimaryFileError::Ambiguous(candidates)),
    }
}

pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn is_resource_fork(path: &Path) -> bool {
    path.components().any(|c| c.as_os_str() == "__MACOSX")
        || path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("._"))
}

/// Extract every file of a zip archive into `dest`, returning the relative
/// paths written.
///
/// Entries whose names would escape `dest` are skipped.
///
/// # Errors
///
/// Returns an error if the archive is corrupt or a file cannot be written.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> SpatialFormatResult<Vec<PathBuf>> {
    let context = archive_path.display().to_string();
    let file = File::open(archive_path).map_err(|source| SpatialFormatReadError::Io {
        source,
        context: Some(context.clone()),
    })?;
    let mut archive = ZipArchive::new(file).map_err(|err| {
        SpatialFormatReadError::parse(format!("Invalid zip archive: {err}"), context.clone())
    })?;

    let mut listing = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx).map_err(|err| {
            SpatialFormatReadError::parse(format!("Corrupt zip entry {idx}: {err}"), context.clone())
        })?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping unsafe zip entry '{}' in {context}", entry.name());
            continue;
        };
        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out).map_err(|source| SpatialFormatReadError::Io {
            source,
            context: Some(format!("{context} member {}", relative.display())),
        })?;
        listing.push(relative);
    }
    log::debug!("Extracted {} files from {context}", listing.len());
    Ok(listing)
}

/// Bundle `parts` into a deflated zip at `zip_path`, storing each under its file name.
///
/// # Errors
///
/// Returns an error if a part cannot be read or the archive cannot be written.
pub fn bundle_files(zip_path: &Path, parts: &[PathBuf]) -> Result<(), SpatialFormatWriteError> {
    let file = File::create(zip_path).map_err(|source| SpatialFormatWriteError::Io {
        source,
        context: Some(zip_path.display().to_string()),
    })?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for part in parts {
        let name = part
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SpatialFormatWriteError::encode(format!("invalid part name {}", part.display()))
            })?
            .to_string();
        zip.start_file(name, options)
            .map_err(|err| SpatialFormatWriteError::encode(format!("zip: {err}")))?;
        let mut source = File::open(part)?;
        io::copy(&mut source, &mut zip)?;
    }
    let mut inner = zip
        .finish()
        .map_err(|err| SpatialFormatWriteError::encode(format!("zip: {err}")))?;
    inner.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_find_primary_file_case_insensitive() {
        let listing = paths(&["roads.DBF", "roads.SHX", "ROADS.SHP", "roads.prj"]);
        assert_eq!(find_primary_file(&listing), Ok(PathBuf::from("ROADS.SHP")));
    }

    #[test]
    fn test_find_primary_file_in_subdirectory() {
        let listing = paths(&["data/parcels.shp", "data/parcels.dbf"]);
        assert_eq!(
            find_primary_file(&listing),
            Ok(PathBuf::from("data/parcels.shp"))
        );
    }

    #[test]
    fn test_find_primary_file_missing() {
        let listing = paths(&["readme.txt", "roads.dbf"]);
        assert_eq!(find_primary_file(&listing), Err(PrimaryFileError::Missing));
    }

    #[test]
    fn test_find_primary_file_ambiguous() {
        let listing = paths(&["a.shp", "b.shp"]);
        assert!(matches!(
            find_primary_file(&listing),
            Err(PrimaryFileError::Ambiguous(c)) if c.len() == 2
        ));
    }

    #[test]
    fn test_resource_forks_are_ignored() {
        let listing = paths(&["__MACOSX/._roads.shp", "._roads.shp", "roads.shp"]);
        assert_eq!(find_primary_file(&listing), Ok(PathBuf::from("roads.shp")));
    }

    #[test]
    fn test_bundle_and_extract() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "alpha").unwrap();
        std::fs::write(&b, "beta").unwrap();
        let zip_path = dir.path().join("bundle.zip");
        bundle_files(&zip_path, &[a, b]).unwrap();

        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let mut listing = extract_archive(&zip_path, &out).unwrap();
        listing.sort();
        assert_eq!(listing, paths(&["a.txt", "b.txt"]));
        assert_eq!(std::fs::read_to_string(out.join("b.txt")).unwrap(), "beta");
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let dir = tempfile::TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.zip");
        std::fs::write(&bogus, "not a zip").unwrap();
        let err = extract_archive(&bogus, dir.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid zip archive"));
    }
}
