//! Updater configuration.
//!
//! Loaded from TOML by the host; every field except `endpoints` has a
//! default so a minimal file only lists where to look for updates.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::UpdateError;
use crate::install::WindowsInstallMode;
use crate::platform::Target;
use crate::signature;

/// Configuration consumed by the update controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Base64 Ed25519 public key; without it artifacts are accepted unverified
    #[serde(default)]
    pub pubkey: Option<String>,

    /// Endpoint URL templates, tried in order
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Whether the host should check for updates when it starts
    #[serde(default = "default_true")]
    pub check_on_startup: bool,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Where artifacts are staged (empty = system temp directory)
    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    /// Installer UI level on Windows
    #[serde(default)]
    pub windows_install_mode: WindowsInstallMode,

    /// Installation directory for Linux tarballs (empty = next to the executable)
    #[serde(default)]
    pub install_dir: Option<PathBuf>,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            pubkey: None,
            endpoints: Vec::new(),
            check_on_startup: true,
            timeout_secs: default_timeout(),
            download_dir: None,
            windows_install_mode: WindowsInstallMode::default(),
            install_dir: None,
            user_agent: default_user_agent(),
        }
    }
}

impl UpdaterConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| UpdateError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check endpoints, key and timeout for obvious mistakes.
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.timeout_secs == 0 {
            return Err(UpdateError::Config("timeout_secs must be positive".to_string()));
        }

        for template in &self.endpoints {
            let rendered = render_endpoint(template, Target::LinuxX86_64, "0.0.0");
            let url = Url::parse(&rendered).map_err(|e| {
                UpdateError::Config(format!("invalid endpoint {:?}: {}", template, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(UpdateError::Config(format!(
                    "endpoint {:?} must use http or https",
                    template
                )));
            }
        }

        if let Some(key) = self.public_key() {
            signature::validate_public_key(key)?;
        }

        Ok(())
    }

    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Directory where downloaded artifacts are staged.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("hatch-updates"))
    }

    /// Configured public key, ignoring blank values.
    pub fn public_key(&self) -> Option<&str> {
        self.pubkey
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Substitute `{{target}}`, `{{arch}}` and `{{current_version}}` in an
/// endpoint template.
pub fn render_endpoint(template: &str, target: Target, current_version: &str) -> String {
    template
        .replace("{{target}}", target.as_str())
        .replace("{{arch}}", target.arch())
        .replace("{{current_version}}", current_version)
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("hatch-updater/{}", env!("CARGO_PKG_VERSION"))
}
