//! Linux installer.
//!
//! AppImage builds are a single file: the runtime exports its own path in
//! the `APPIMAGE` environment variable, and the update is staged next to it
//! and renamed over it. Tarball builds are unpacked over the installation
//! directory.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{copy_dir_all, install_io, unsupported, ArtifactKind, InstallOutcome, PlatformInstaller};
use crate::archive;
use crate::error::UpdateError;
use crate::launcher::{self, ProcessLauncher};

/// Environment variable set by the AppImage runtime.
pub const APPIMAGE_ENV: &str = "APPIMAGE";

/// Installer for AppImage and tarball builds.
pub struct LinuxInstaller {
    launcher: Arc<dyn ProcessLauncher>,
    /// Value of `APPIMAGE` captured at construction
    appimage: Option<PathBuf>,
    install_dir: Option<PathBuf>,
}

impl LinuxInstaller {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            appimage: std::env::var_os(APPIMAGE_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            install_dir: None,
        }
    }

    /// Override the AppImage location normally read from `APPIMAGE`.
    pub fn with_appimage(mut self, path: Option<PathBuf>) -> Self {
        self.appimage = path;
        self
    }

    /// Directory tarball contents are copied into (default: next to the executable).
    pub fn with_install_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.install_dir = dir;
        self
    }

    fn current_appimage(&self) -> Result<&Path, UpdateError> {
        self.appimage.as_deref().ok_or_else(|| {
            UpdateError::CannotLocateCurrentArtifact(format!("{} is not set", APPIMAGE_ENV))
        })
    }

    fn install_dir(&self) -> Result<PathBuf, UpdateError> {
        if let Some(dir) = &self.install_dir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe()
            .map_err(|e| UpdateError::CannotLocateCurrentArtifact(e.to_string()))?;
        exe.parent().map(Path::to_path_buf).ok_or_else(|| {
            UpdateError::CannotLocateCurrentArtifact(format!("{} has no parent", exe.display()))
        })
    }

    fn install_appimage(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError> {
        let target = self.current_appimage()?;
        let staged = staging_path(target);
        info!("Replacing AppImage {:?}", target);

        if let Err(e) = stage_and_rename(artifact, &staged, target) {
            if staged.exists() {
                let _ = fs::remove_file(&staged);
            }
            return Err(e);
        }
        Ok(InstallOutcome::Completed)
    }

    fn install_tarball(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError> {
        let dir = self.install_dir()?;
        let extracted = archive::extract_to_temp(artifact)?;
        info!("Copying update into {:?}", dir);
        copy_dir_all(extracted.path(), &dir)?;
        Ok(InstallOutcome::Completed)
    }
}

#[async_trait]
impl PlatformInstaller for LinuxInstaller {
    async fn install(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError> {
        info!("Starting Linux update installation from {:?}", artifact);

        match ArtifactKind::from_path(artifact) {
            Some(ArtifactKind::AppImage) => self.install_appimage(artifact),
            Some(ArtifactKind::TarGz) => self.install_tarball(artifact),
            _ => Err(unsupported(artifact)),
        }
    }

    fn relaunch(&self) -> Result<(), UpdateError> {
        let program = match &self.appimage {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(|e| UpdateError::Restart(e.to_string()))?,
        };
        info!("Relaunching {:?}", program);
        self.launcher
            .spawn(&OsString::from(program), &launcher::current_args())
            .map_err(|e| UpdateError::Restart(e.to_string()))
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.new", name))
}

fn stage_and_rename(artifact: &Path, staged: &Path, target: &Path) -> Result<(), UpdateError> {
    debug!("Staging {:?} as {:?}", artifact, staged);
    fs::copy(artifact, staged).map_err(|e| install_io("copy", staged, e))?;
    set_executable(staged)?;
    fs::rename(staged, target).map_err(|e| {
        warn!("Renaming staged AppImage failed: {}", e);
        install_io("rename", target, e)
    })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), UpdateError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| install_io("chmod", path, e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), UpdateError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::write_tar_gz;
    use crate::launcher::test_support::RecordingLauncher;
    use tempfile::TempDir;

    fn installer() -> LinuxInstaller {
        LinuxInstaller::new(Arc::new(RecordingLauncher::default())).with_appimage(None)
    }

    #[tokio::test]
    async fn test_appimage_replaced() {
        let dir = TempDir::new().unwrap();
        let current = dir.path().join("Demo.AppImage");
        fs::write(&current, b"v1").unwrap();
        let artifact = dir.path().join("Demo_1.1.0_amd64.AppImage");
        fs::write(&artifact, b"v2").unwrap();

        let outcome = installer()
            .with_appimage(Some(current.clone()))
            .install(&artifact)
            .await
            .unwrap();

        assert_eq!(outcome, InstallOutcome::Completed);
        assert_eq!(fs::read(&current).unwrap(), b"v2");
        assert!(!staging_path(&current).exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&current).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn test_appimage_without_marker() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("Demo.AppImage");
        fs::write(&artifact, b"v2").unwrap();

        let err = installer().install(&artifact).await.unwrap_err();
        assert!(err.is_location_error());
        assert!(matches!(err, UpdateError::CannotLocateCurrentArtifact(_)));
    }

    #[tokio::test]
    async fn test_appimage_copy_failure_leaves_current() {
        let dir = TempDir::new().unwrap();
        let current = dir.path().join("Demo.AppImage");
        fs::write(&current, b"v1").unwrap();

        let err = installer()
            .with_appimage(Some(current.clone()))
            .install(&dir.path().join("missing.AppImage"))
            .await
            .unwrap_err();

        assert!(matches!(err, UpdateError::InstallIo(_)));
        assert_eq!(fs::read(&current).unwrap(), b"v1");
    }

    #[tokio::test]
    async fn test_tarball_copied_over_install_dir() {
        let dir = TempDir::new().unwrap();
        let install_dir = dir.path().join("opt/demo");
        fs::create_dir_all(&install_dir).unwrap();
        fs::write(install_dir.join("demo"), b"v1").unwrap();
        fs::write(install_dir.join("user.cfg"), b"keep").unwrap();

        let artifact = dir.path().join("demo.tar.gz");
        write_tar_gz(&artifact, &[("demo", b"v2"), ("resources/data.bin", b"d")]);

        installer()
            .with_install_dir(Some(install_dir.clone()))
            .install(&artifact)
            .await
            .unwrap();

        assert_eq!(fs::read(install_dir.join("demo")).unwrap(), b"v2");
        assert_eq!(fs::read(install_dir.join("resources/data.bin")).unwrap(), b"d");
        assert_eq!(fs::read(install_dir.join("user.cfg")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let err = installer().install(Path::new("/tmp/setup.exe")).await.unwrap_err();
        assert!(matches!(err, UpdateError::UnsupportedArtifactFormat(_)));
    }

    #[test]
    fn test_relaunch_spawns_appimage() {
        let launcher = Arc::new(RecordingLauncher::default());
        let installer = LinuxInstaller::new(launcher.clone())
            .with_appimage(Some(PathBuf::from("/home/u/Demo.AppImage")));

        installer.relaunch().unwrap();

        let calls = launcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/home/u/Demo.AppImage");
    }
}
