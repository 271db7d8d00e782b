//! Windows installer.
//!
//! Runs the downloaded NSIS `.exe` or `.msi` package and waits for it to
//! exit. The package performs the actual file replacement; a non-zero exit
//! code fails the install.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{install_io, unsupported, ArtifactKind, InstallOutcome, PlatformInstaller};
use crate::error::UpdateError;
use crate::launcher::{self, ProcessLauncher};

/// How much installer UI the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowsInstallMode {
    /// Progress bar only, no prompts
    #[default]
    Passive,
    /// Basic UI with a cancel button
    BasicUi,
    /// No UI at all
    Quiet,
}

impl WindowsInstallMode {
    fn exe_args(&self) -> &'static [&'static str] {
        match self {
            WindowsInstallMode::Passive | WindowsInstallMode::Quiet => &["/S", "/NORESTART"],
            WindowsInstallMode::BasicUi => &["/NORESTART"],
        }
    }

    fn msi_args(&self) -> &'static [&'static str] {
        match self {
            WindowsInstallMode::Passive => &["/passive", "/norestart"],
            WindowsInstallMode::BasicUi => &["/qb", "/norestart"],
            WindowsInstallMode::Quiet => &["/quiet", "/norestart"],
        }
    }
}

/// Installer for Windows setup packages.
pub struct WindowsInstaller {
    launcher: Arc<dyn ProcessLauncher>,
    mode: WindowsInstallMode,
}

impl WindowsInstaller {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            mode: WindowsInstallMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: WindowsInstallMode) -> Self {
        self.mode = mode;
        self
    }

    /// Program and arguments that install `artifact`.
    fn command_for(&self, artifact: &Path) -> Result<(OsString, Vec<OsString>), UpdateError> {
        let path = artifact.as_os_str().to_owned();
        match ArtifactKind::from_path(artifact) {
            Some(ArtifactKind::Exe) => Ok((
                path,
                self.mode.exe_args().iter().map(OsString::from).collect(),
            )),
            Some(ArtifactKind::Msi) => {
                let mut args = vec![OsString::from("/i"), path];
                args.extend(self.mode.msi_args().iter().map(OsString::from));
                Ok((OsString::from("msiexec"), args))
            }
            _ => Err(unsupported(artifact)),
        }
    }
}

#[async_trait]
impl PlatformInstaller for WindowsInstaller {
    async fn install(&self, artifact: &Path) -> Result<InstallOutcome, UpdateError> {
        info!("Starting Windows update installation from {:?}", artifact);
        let (program, args) = self.command_for(artifact)?;

        let launcher = Arc::clone(&self.launcher);
        let code = tokio::task::spawn_blocking(move || launcher.run(&program, &args))
            .await
            .map_err(|e| UpdateError::InstallIo(format!("installer task failed: {}", e)))?
            .map_err(|e| install_io("run installer", artifact, e))?;

        match code {
            Some(0) => {
                info!("Windows update installation completed successfully");
                Ok(InstallOutcome::Completed)
            }
            code => {
                warn!("Installer exited with {:?}", code);
                Err(UpdateError::InstallerExitCode { code })
            }
        }
    }

    fn relaunch(&self) -> Result<(), UpdateError> {
        let exe = std::env::current_exe().map_err(|e| UpdateError::Restart(e.to_string()))?;
        info!("Relaunching {:?}", exe);
        self.launcher
            .spawn(&exe.into_os_string(), &launcher::current_args())
            .map_err(|e| UpdateError::Restart(e.to_string()))
    }
}
