//! macOS installer.
//!
//! Tarball updates replace the running `.app` bundle in place: the current
//! bundle is renamed to `<name>.old`, the new one is moved into its path and
//! the backup is deleted. If the move fails the partial bundle is removed
//! and the backup renamed back before the error is returned.
//!
//! Disk images cannot be applied silently, so `.dmg` updates are opened in
//! Finder and left to the user.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{install_io, move_dir, unsupported, ArtifactKind, InstallOutcome, PlatformInstaller};
use crate::archive;
use crate::error::UpdateError;
use crate::launcher::{self, ProcessLauncher};

const BUNDLE_EXTENSION: &str = "app";

/// Installer for macOS application bundles.
pub struct MacOsInstaller {
    launcher: Arc<dyn ProcessLauncher>,
    /// Overrides bundle discovery
    bundle_path: Option<PathBuf>,
    /// Where tarballs are unpacked; system temp when unset
    staging_dir: Option<PathBuf>,
}

impl MacOsInstaller {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            bundle_path: None,
            staging_dir: None,
        }
    }

    /// Use `path` as the installed bundle instead of discovering it.
    pub fn with_bundle_path(mut self, path: PathBuf) -> Self {
        self.bundle_path = Some(path);
        self
    }

    /// Unpack tarballs under `dir`. Placing it on the same volume as the
    /// bundle keeps the final move a rename.
    pub fn with_staging_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Find the `.app` bundle the application runs from.
    ///
    /// Walks up from the working directory, then from the running
    /// executable, looking for a directory with an `.app` suffix.
    pub fn locate_bundle(&self) -> Result<PathBuf, UpdateError> {
        if let Some(path) = &self.bundle_path {
            return Ok(path.clone());
        }

        let from_cwd = std::env::current_dir()
            .ok()
            .and_then(|dir| find_app_ancestor(&dir));
        let found = from_cwd.or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| find_app_ancestor(&exe))
        });

        found.ok_or(UpdateError::BundleNotLocatable)
    }

    async fn install_tarball(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError> {
        let extracted = archive::extract_to_temp_in(artifact, self.staging_dir.as_deref())?;
        let new_bundle = find_bundle_in(extracted.path())?;
        let current = self.locate_bundle()?;

        info!("Replacing bundle {:?} with {:?}", current, new_bundle);
        swap_bundle(&current, &new_bundle)?;
        Ok(InstallOutcome::Completed)
    }

    fn open_disk_image(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError> {
        info!("Opening disk image {:?}", artifact);
        self.launcher
            .spawn(&OsString::from("open"), &[artifact.as_os_str().to_owned()])
            .map_err(|e| install_io("open", artifact, e))?;
        Ok(InstallOutcome::HandedOff)
    }
}

#[async_trait]
impl PlatformInstaller for MacOsInstaller {
    async fn install(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError> {
        info!("Starting macOS update installation from {:?}", artifact);

        match ArtifactKind::from_path(artifact) {
            Some(ArtifactKind::TarGz) => self.install_tarball(artifact).await,
            Some(ArtifactKind::Dmg) => self.open_disk_image(artifact),
            _ => Err(unsupported(artifact)),
        }
    }

    fn relaunch(&self) -> Result<(), UpdateError> {
        let result = match self.locate_bundle() {
            Ok(bundle) => {
                info!("Relaunching bundle {:?}", bundle);
                self.launcher.spawn(
                    &OsString::from("open"),
                    &[OsString::from("-n"), bundle.into_os_string()],
                )
            }
            Err(_) => {
                let exe = std::env::current_exe()
                    .map_err(|e| UpdateError::Restart(e.to_string()))?;
                info!("Relaunching executable {:?}", exe);
                self.launcher
                    .spawn(&exe.into_os_string(), &launcher::current_args())
            }
        };
        result.map_err(|e| UpdateError::Restart(e.to_string()))
    }
}

/// Nearest ancestor of `path` (itself included) that is an `.app` directory.
fn find_app_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| is_bundle_dir(p))
        .map(Path::to_path_buf)
}

fn is_bundle_dir(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == BUNDLE_EXTENSION) && path.is_dir()
}

/// The single `.app` directory at the top level of `dir`.
fn find_bundle_in(dir: &Path) -> Result<PathBuf, UpdateError> {
    let mut bundles = fs::read_dir(dir)
        .map_err(|e| install_io("read", dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_bundle_dir(path));

    match (bundles.next(), bundles.next()) {
        (Some(bundle), None) => Ok(bundle),
        (Some(_), Some(_)) => {
            warn!("Archive contains more than one .app bundle");
            Err(UpdateError::NoBundleFound)
        }
        (None, _) => Err(UpdateError::NoBundleFound),
    }
}

fn backup_path(bundle: &Path) -> PathBuf {
    let mut name = bundle.as_os_str().to_owned();
    name.push(".old");
    PathBuf::from(name)
}

/// Replace the bundle at `current` with `replacement`, restoring the
/// original if the replacement cannot be moved into place.
pub(crate) fn swap_bundle(current: &Path, replacement: &Path) -> Result<(), UpdateError> {
    let backup = backup_path(current);

    if backup.exists() {
        debug!("Removing stale backup {:?}", backup);
        fs::remove_dir_all(&backup).map_err(|e| install_io("remove", &backup, e))?;
    }

    fs::rename(current, &backup).map_err(|e| install_io("rename", current, e))?;

    if let Err(e) = move_dir(replacement, current) {
        warn!("Moving new bundle into place failed, restoring {:?}: {}", backup, e);
        if current.exists() {
            if let Err(remove_err) = fs::remove_dir_all(current) {
                error!("Failed to remove partial bundle {:?}: {}", current, remove_err);
            }
        }
        if let Err(restore_err) = fs::rename(&backup, current) {
            error!("Failed to restore {:?} from {:?}: {}", current, backup, restore_err);
        }
        return Err(e);
    }

    if let Err(e) = fs::remove_dir_all(&backup) {
        warn!("Failed to remove backup {:?}: {}", backup, e);
    }
    Ok(())
}
