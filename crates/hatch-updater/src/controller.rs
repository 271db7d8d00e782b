//! Update controller - orchestrates check, download, install and restart.
//!
//! The controller owns the [`UpdateSession`] and drives it through
//!
//! ```text
//! Idle -> Checking -> UpToDate | UpdateAvailable -> Downloading -> Downloaded
//!      -> Installing -> Installed
//! ```
//!
//! with any step able to land in `Error`. `Checking`, `Downloading` and
//! `Installing` are in-flight phases: while one is active every other
//! operation is rejected with [`UpdateError::SessionBusy`]. The session lock
//! is only held to read or switch the phase, never across an await.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use semver::Version;
use tracing::{debug, error, info, warn};

use crate::config::{render_endpoint, UpdaterConfig};
use crate::error::UpdateError;
use crate::host::{HostEvent, HostNotifier, TracingNotifier};
use crate::http::{HttpClient, ReqwestClient};
use crate::install::{installer_for, InstallOutcome, PlatformInstaller};
use crate::launcher::SystemLauncher;
use crate::manifest::{ManifestResponse, UpdateInfo, UpdateManifest};
use crate::platform::{Platform, Target};
use crate::signature::{self, Verification};

/// File name used when the download URL has no usable last segment.
const FALLBACK_ARTIFACT_NAME: &str = "update.bin";

/// Where the session is in the update cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable,
    Downloading,
    Downloaded,
    Installing,
    Installed,
    Error(String),
}

impl UpdatePhase {
    /// Whether an operation is currently running.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            UpdatePhase::Checking | UpdatePhase::Downloading | UpdatePhase::Installing
        )
    }
}

/// Working state of one update cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSession {
    pub current_version: String,
    pub last_check_result: Option<UpdateInfo>,
    pub downloaded_artifact_path: Option<PathBuf>,
    pub phase: UpdatePhase,
}

/// Drives the update pipeline for one application instance.
///
/// # Example
///
/// ```ignore
/// use hatch_updater::{UpdateController, UpdaterConfig};
///
/// let config = UpdaterConfig::load_from_file(path)?;
/// let controller = UpdateController::for_current_platform(config, "1.0.0")?;
///
/// if let Some(info) = controller.check().await? {
///     println!("Update available: {}", info.version);
///     controller.download(|fraction| println!("{:.0}%", fraction * 100.0)).await?;
///     controller.install_and_restart().await?;
/// }
/// ```
pub struct UpdateController {
    config: UpdaterConfig,
    target: Option<Target>,
    installer: Arc<dyn PlatformInstaller>,
    http: Arc<dyn HttpClient>,
    notifier: Arc<dyn HostNotifier>,
    session: Mutex<UpdateSession>,
}

impl UpdateController {
    /// Create a controller from explicit collaborators.
    ///
    /// The target defaults to the running one; see [`Self::with_target`].
    pub fn new(
        config: UpdaterConfig,
        current_version: impl Into<String>,
        installer: Arc<dyn PlatformInstaller>,
        http: Arc<dyn HttpClient>,
        notifier: Arc<dyn HostNotifier>,
    ) -> Self {
        Self {
            config,
            target: Target::current(),
            installer,
            http,
            notifier,
            session: Mutex::new(UpdateSession {
                current_version: current_version.into(),
                ..Default::default()
            }),
        }
    }

    /// Create a controller wired with the production collaborators for the
    /// running platform.
    pub fn for_current_platform(
        config: UpdaterConfig,
        current_version: impl Into<String>,
    ) -> Result<Self, UpdateError> {
        let platform = Platform::current()
            .ok_or_else(|| UpdateError::Config("unsupported platform".to_string()))?;
        let installer = installer_for(platform, &config, Arc::new(SystemLauncher));
        let http = Arc::new(ReqwestClient::new(&config.user_agent)?);

        Ok(Self::new(
            config,
            current_version,
            installer,
            http,
            Arc::new(TracingNotifier),
        ))
    }

    /// Resolve manifests for `target` instead of the running target.
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn phase(&self) -> UpdatePhase {
        self.lock().phase.clone()
    }

    /// Snapshot of the session.
    pub fn session(&self) -> UpdateSession {
        self.lock().clone()
    }

    pub fn last_check_result(&self) -> Option<UpdateInfo> {
        self.lock().last_check_result.clone()
    }

    fn lock(&self) -> MutexGuard<'_, UpdateSession> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enter `next` if no operation is running and `allowed` accepts the
    /// current session. Returns a snapshot taken before the switch.
    fn begin(
        &self,
        next: UpdatePhase,
        allowed: impl FnOnce(&UpdateSession) -> bool,
    ) -> Result<UpdateSession, UpdateError> {
        let mut session = self.lock();
        if session.phase.is_in_flight() {
            return Err(UpdateError::SessionBusy);
        }
        if !allowed(&session) {
            return Err(UpdateError::InvalidState(format!(
                "cannot enter {:?} from {:?}",
                next, session.phase
            )));
        }
        let snapshot = session.clone();
        session.phase = next;
        Ok(snapshot)
    }

    fn fail(&self, err: &UpdateError) {
        error!("Update failed: {}", err);
        self.lock().phase = UpdatePhase::Error(err.to_string());
        self.notifier.emit(HostEvent::UpdateError(err.to_string()));
    }

    /// Check only if the startup check is enabled.
    pub async fn check_on_startup(&self) -> Result<Option<UpdateInfo>, UpdateError> {
        if !self.config.check_on_startup {
            debug!("Startup update check disabled");
            return Ok(None);
        }
        self.check().await
    }

    /// Ask the configured endpoints for a newer version.
    ///
    /// Endpoints are tried in order; the first one that answers with a
    /// parseable manifest or 204 decides the result. Returns `Ok(None)`
    /// when no newer version applies to this target.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::SessionBusy`] if another operation is running
    /// - [`UpdateError::Network`] if every endpoint failed at transport level
    pub async fn check(&self) -> Result<Option<UpdateInfo>, UpdateError> {
        let snapshot = self.begin(UpdatePhase::Checking, |_| true)?;
        // Installed with an artifact still recorded means it was handed off
        // to the user; anything else left over is a stale download.
        if snapshot.phase != UpdatePhase::Installed {
            if let Some(stale) = &snapshot.downloaded_artifact_path {
                remove_artifact(stale).await;
            }
        }

        info!("Checking for updates (current: {})", snapshot.current_version);
        let result = self.query_endpoints(&snapshot.current_version).await;

        match &result {
            Ok(found) => {
                {
                    let mut session = self.lock();
                    session.last_check_result = found.clone();
                    session.downloaded_artifact_path = None;
                    session.phase = if found.is_some() {
                        UpdatePhase::UpdateAvailable
                    } else {
                        UpdatePhase::UpToDate
                    };
                }
                match found {
                    Some(info) => {
                        info!("Update available: {} -> {}", snapshot.current_version, info.version);
                        self.notifier.emit(HostEvent::UpdateAvailable(info.clone()));
                    }
                    None => info!("No update available"),
                }
            }
            Err(e) => {
                self.lock().downloaded_artifact_path = None;
                self.fail(e);
            }
        }
        result
    }

    async fn query_endpoints(&self, current_version: &str) -> Result<Option<UpdateInfo>, UpdateError> {
        let endpoints = &self.config.endpoints;
        if endpoints.is_empty() {
            debug!("No update endpoints configured");
            return Ok(None);
        }
        let target = self
            .target
            .ok_or_else(|| UpdateError::Config("unsupported platform".to_string()))?;

        let mut transport_failures = 0usize;
        let mut last_transport_error = None;

        for template in endpoints {
            let url = render_endpoint(template, target, current_version);
            debug!("Querying update endpoint {}", url);

            let response = match self.http.get(&url, self.config.timeout()).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Endpoint {} failed: {}", url, e);
                    transport_failures += 1;
                    last_transport_error = Some(e);
                    continue;
                }
            };

            if !response.is_success() {
                warn!("Endpoint {} returned status {}", url, response.status);
                transport_failures += 1;
                last_transport_error = Some(UpdateError::Network(format!(
                    "{} returned status {}",
                    url, response.status
                )));
                continue;
            }

            match ManifestResponse::from_http(response.status, &response.body) {
                Ok(ManifestResponse::NoContent) => {
                    debug!("Endpoint {} reports no update", url);
                    return Ok(None);
                }
                Ok(ManifestResponse::Manifest(manifest)) => {
                    return Ok(self.evaluate(&manifest, target, current_version));
                }
                Err(e) => {
                    warn!("Endpoint {} returned an unusable manifest: {}", url, e);
                }
            }
        }

        if transport_failures == endpoints.len() {
            return Err(last_transport_error
                .unwrap_or_else(|| UpdateError::Network("all endpoints failed".to_string())));
        }
        Ok(None)
    }

    fn evaluate(
        &self,
        manifest: &UpdateManifest,
        target: Target,
        current_version: &str,
    ) -> Option<UpdateInfo> {
        let info = manifest.resolve(target)?;
        if is_newer(&info.version, current_version) {
            Some(info)
        } else {
            debug!("Latest version {} is not newer than {}", info.version, current_version);
            None
        }
    }

    /// Download the update found by the last check and verify it.
    ///
    /// `on_progress` receives fractions in `[0.0, 1.0]`; the same values are
    /// emitted as `download-progress` events. Returns the artifact path.
    pub async fn download<F>(&self, on_progress: F) -> Result<PathBuf, UpdateError>
    where
        F: Fn(f64) + Send + Sync,
    {
        let snapshot = self.begin(UpdatePhase::Downloading, |s| {
            s.phase == UpdatePhase::UpdateAvailable && s.last_check_result.is_some()
        })?;
        let Some(info) = snapshot.last_check_result else {
            return Err(UpdateError::InvalidState("no update to download".to_string()));
        };

        match self.fetch_and_verify(&info, &on_progress).await {
            Ok(path) => {
                {
                    let mut session = self.lock();
                    session.downloaded_artifact_path = Some(path.clone());
                    session.phase = UpdatePhase::Downloaded;
                }
                self.notifier.emit(HostEvent::UpdateReady {
                    version: info.version.clone(),
                });
                Ok(path)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn fetch_and_verify(
        &self,
        info: &UpdateInfo,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<PathBuf, UpdateError> {
        let dir = self.config.download_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let file_name = info
            .artifact_file_name()
            .unwrap_or_else(|| FALLBACK_ARTIFACT_NAME.to_string());
        let dest = dir.join(file_name);

        let notifier = &self.notifier;
        let report = |fraction: f64| {
            let fraction = fraction.clamp(0.0, 1.0);
            on_progress(fraction);
            notifier.emit(HostEvent::DownloadProgress(fraction));
        };

        info!("Downloading {} to {:?}", info.download_url, dest);
        if let Err(e) = self
            .http
            .download(&info.download_url, &dest, self.config.timeout(), &report)
            .await
        {
            remove_artifact(&dest).await;
            return Err(e);
        }

        match self.verify_artifact(info, &dest).await {
            Ok(Verification::Verified) => {
                info!("Artifact signature verified");
                Ok(dest)
            }
            Ok(Verification::Unverified) => {
                self.notifier.emit(HostEvent::UpdateWarning(format!(
                    "update {} was not signature-verified: no public key configured",
                    info.version
                )));
                Ok(dest)
            }
            Err(e) => {
                if e.is_signature_error() {
                    warn!("Rejected artifact from {}: {}", info.download_url, e);
                }
                remove_artifact(&dest).await;
                Err(e)
            }
        }
    }

    async fn verify_artifact(&self, info: &UpdateInfo, path: &Path) -> Result<Verification, UpdateError> {
        let bytes = tokio::fs::read(path).await?;

        if info.size > 0 && bytes.len() as u64 != info.size {
            return Err(UpdateError::SizeMismatch {
                expected: info.size,
                actual: bytes.len() as u64,
            });
        }

        signature::enforce(&bytes, info.signature.as_deref(), self.config.public_key())
    }

    /// Install the downloaded artifact without restarting.
    pub async fn install(&self) -> Result<InstallOutcome, UpdateError> {
        let snapshot = self.begin(UpdatePhase::Installing, |s| {
            s.phase == UpdatePhase::Downloaded && s.downloaded_artifact_path.is_some()
        })?;
        let Some(artifact) = snapshot.downloaded_artifact_path else {
            return Err(UpdateError::InvalidState("no downloaded artifact".to_string()));
        };

        match self.installer.install(&artifact).await {
            Ok(outcome) => {
                if outcome == InstallOutcome::Completed {
                    remove_artifact(&artifact).await;
                }
                let mut session = self.lock();
                if outcome == InstallOutcome::Completed {
                    session.downloaded_artifact_path = None;
                }
                session.phase = UpdatePhase::Installed;
                info!("Install finished: {:?}", outcome);
                Ok(outcome)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Relaunch the application. Only returns on failure.
    pub fn restart(&self) -> Result<Infallible, UpdateError> {
        self.notifier.emit(HostEvent::BeforeRestart);
        let err = match self.installer.restart() {
            Ok(never) => match never {},
            Err(e) => e,
        };
        error!("Restart failed: {}", err);
        self.notifier.emit(HostEvent::UpdateError(err.to_string()));
        Err(err)
    }

    /// Install, then restart into the new version.
    ///
    /// Returns only if the install was handed off to the user or failed, or
    /// if the restart failed; a failed restart leaves the phase `Installed`.
    pub async fn install_and_restart(&self) -> Result<InstallOutcome, UpdateError> {
        let outcome = self.install().await?;
        if outcome == InstallOutcome::HandedOff {
            info!("Install handed off to the user, not restarting");
            return Ok(outcome);
        }
        match self.restart()? {}
    }
}

/// Whether `candidate` should replace `current`.
///
/// Uses semver ordering when both parse, otherwise any difference counts.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    let parse = |v: &str| Version::parse(v.trim().trim_start_matches('v'));
    match (parse(candidate), parse(current)) {
        (Ok(candidate), Ok(current)) => candidate > current,
        _ => candidate.trim() != current.trim(),
    }
}

async fn remove_artifact(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove artifact {:?}: {}", path, e);
        }
    }
}
