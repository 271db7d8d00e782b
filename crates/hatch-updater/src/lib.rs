//! # hatch-updater
//!
//! Update pipeline for desktop applications.
//!
//! This crate handles:
//! - Polling update endpoints and resolving their manifests for this target
//! - Ed25519 verification of downloaded artifacts
//! - Platform-specific installation (macOS bundles, Windows installers,
//!   Linux AppImages and tarballs)
//! - Restarting into the new version
//!
//! ## Security
//!
//! When a public key is configured, an artifact whose signature is missing
//! or does not verify is deleted and never handed to an installer. Without a
//! key, artifacts are accepted and the host receives an `update-warning`.

pub mod archive;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod http;
pub mod install;
pub mod launcher;
pub mod manifest;
pub mod platform;
#[cfg(test)]
mod proptests;
pub mod signature;

// Re-export main types for convenience
pub use config::{render_endpoint, UpdaterConfig};
pub use controller::{is_newer, UpdateController, UpdatePhase, UpdateSession};
pub use error::UpdateError;
pub use host::{HostEvent, HostNotifier, TracingNotifier};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use install::{
    installer_for, InstallOutcome, LinuxInstaller, MacOsInstaller, PlatformInstaller,
    WindowsInstallMode, WindowsInstaller,
};
pub use launcher::{ProcessLauncher, SystemLauncher};
pub use manifest::{ManifestResponse, UpdateInfo, UpdateManifest};
pub use platform::{Platform, Target};
pub use signature::{generate_keypair, sign, verify, SigningKeyPair};
