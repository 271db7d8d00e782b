//! Gzip-compressed tarball handling shared by the macOS and Linux installers.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::TempDir;
use tracing::debug;

use crate::error::UpdateError;

/// Whether `path` names a `.tar.gz` or `.tgz` archive.
pub fn is_tar_gz(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Unpack a `.tar.gz` archive into `dest`, creating it if needed.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), UpdateError> {
    debug!("Extracting {:?} into {:?}", archive, dest);

    let file = File::open(archive)
        .map_err(|e| UpdateError::InstallIo(format!("open {}: {}", archive.display(), e)))?;
    fs::create_dir_all(dest)
        .map_err(|e| UpdateError::InstallIo(format!("create {}: {}", dest.display(), e)))?;

    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    tar.set_preserve_permissions(true);
    tar.unpack(dest)
        .map_err(|e| UpdateError::InstallIo(format!("extract {}: {}", archive.display(), e)))?;
    Ok(())
}

/// Unpack a `.tar.gz` archive into a fresh temporary directory.
///
/// The directory is removed when the returned handle is dropped.
pub fn extract_to_temp(archive: &Path) -> Result<TempDir, UpdateError> {
    extract_to_temp_in(archive, None)
}

/// Like [`extract_to_temp`], but creates the directory under `base` when
/// given instead of the system temp directory.
pub fn extract_to_temp_in(archive: &Path, base: Option<&Path>) -> Result<TempDir, UpdateError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("hatch-extract-");
    let dir = match base {
        Some(base) => {
            std::fs::create_dir_all(base)?;
            builder.tempdir_in(base)
        }
        None => builder.tempdir(),
    }
    .map_err(|e| UpdateError::InstallIo(format!("create temp dir: {}", e)))?;
    extract_tar_gz(archive, dir.path())?;
    Ok(dir)
}
