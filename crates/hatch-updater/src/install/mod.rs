//! Platform-specific update installation.
//!
//! Each platform gets a [`PlatformInstaller`] that knows which artifact
//! formats it accepts and how to put them in place:
//!
//! - macOS: `.app` bundle swap from a tarball, or `.dmg` hand-off
//! - Windows: NSIS `.exe` or `.msi` run silently
//! - Linux: AppImage replacement, or tarball copied over the install dir
//!
//! The installer is picked once from the detected [`Platform`] and injected
//! into the controller.

use std::convert::Infallible;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::UpdaterConfig;
use crate::error::UpdateError;
use crate::launcher::ProcessLauncher;
use crate::platform::Platform;

pub mod linux;
pub mod macos;
pub mod windows;

pub use linux::LinuxInstaller;
pub use macos::MacOsInstaller;
pub use windows::{WindowsInstallMode, WindowsInstaller};

/// What state an install left the system in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The new version is on disk and will run after a restart
    Completed,
    /// The user has to finish the install (e.g. drag from a mounted `.dmg`)
    HandedOff,
}

/// Platform-specific update installer.
#[async_trait]
pub trait PlatformInstaller: Send + Sync {
    /// Install the downloaded artifact.
    async fn install(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError>;

    /// Start a fresh instance of the application.
    fn relaunch(&self) -> Result<(), UpdateError>;

    /// Relaunch the application and exit the current process.
    ///
    /// Only returns on failure.
    fn restart(&self) -> Result<Infallible, UpdateError> {
        self.relaunch()?;
        info!("Relaunched application, exiting");
        std::process::exit(0)
    }
}

/// Select the installer for `platform`.
pub fn installer_for(
    platform: Platform,
    config: &UpdaterConfig,
    launcher: Arc<dyn ProcessLauncher>,
) -> Arc<dyn PlatformInstaller> {
    match platform {
        Platform::MacOs => Arc::new(MacOsInstaller::new(launcher)),
        Platform::Windows => Arc::new(
            WindowsInstaller::new(launcher).with_mode(config.windows_install_mode),
        ),
        Platform::Linux => Arc::new(
            LinuxInstaller::new(launcher).with_install_dir(config.install_dir.clone()),
        ),
    }
}

/// Artifact formats recognized by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    TarGz,
    Dmg,
    Exe,
    Msi,
    AppImage,
}

impl ArtifactKind {
    /// Classify `path` by its extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        if crate::archive::is_tar_gz(path) {
            return Some(Self::TarGz);
        }
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "dmg" => Some(Self::Dmg),
            "exe" => Some(Self::Exe),
            "msi" => Some(Self::Msi),
            "appimage" => Some(Self::AppImage),
            _ => None,
        }
    }
}

pub(crate) fn unsupported(artifact: &Path) -> UpdateError {
    UpdateError::UnsupportedArtifactFormat(
        artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| artifact.display().to_string()),
    )
}

pub(crate) fn install_io(action: &str, path: &Path, err: std::io::Error) -> UpdateError {
    UpdateError::InstallIo(format!("{} {}: {}", action, path.display(), err))
}

/// Recursively copy `src` into `dst`, overwriting existing files.
pub(crate) fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), UpdateError> {
    fs::create_dir_all(dst).map_err(|e| install_io("create", dst, e))?;

    for entry in fs::read_dir(src).map_err(|e| install_io("read", src, e))? {
        let entry = entry.map_err(|e| install_io("read", src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| install_io("stat", &from, e))?;

        if file_type.is_dir() {
            copy_dir_all(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| install_io("copy", &from, e))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<(), UpdateError> {
    let target = fs::read_link(from).map_err(|e| install_io("read link", from, e))?;
    if fs::symlink_metadata(to).is_ok() {
        fs::remove_file(to).map_err(|e| install_io("remove", to, e))?;
    }
    std::os::unix::fs::symlink(&target, to).map_err(|e| install_io("link", to, e))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<(), UpdateError> {
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| install_io("copy", from, e))
}

/// Move a directory, falling back to copy + delete across filesystems.
pub(crate) fn move_dir(src: &Path, dst: &Path) -> Result<(), UpdateError> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("Rename {:?} -> {:?} failed ({}), copying instead", src, dst, e);
            copy_dir_all(src, dst)?;
            fs::remove_dir_all(src).map_err(|e| install_io("remove", src, e))
        }
    }
}
