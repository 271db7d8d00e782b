//! Error types for the update pipeline.

use thiserror::Error;

/// Errors that can occur while checking, downloading or installing an update.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Transport failure talking to an endpoint or artifact host
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be parsed as a manifest
    #[error("manifest parse error: {0}")]
    Parse(String),

    /// Multi-platform manifest has no entry for this target
    #[error("no update published for target {target}")]
    NoMatchingPlatform { target: String },

    /// A public key is configured but the manifest carries no signature
    #[error("update is not signed but a public key is configured")]
    SignatureMissing,

    /// Signature does not match the downloaded artifact
    #[error("artifact signature verification failed")]
    SignatureInvalid,

    /// The installer does not know how to handle this artifact
    #[error("unsupported artifact format: {0}")]
    UnsupportedArtifactFormat(String),

    /// Extracted archive contains no application bundle
    #[error("no .app bundle found in archive")]
    NoBundleFound,

    /// The running application bundle could not be found on disk
    #[error("could not locate the running application bundle")]
    BundleNotLocatable,

    /// The running artifact (AppImage, executable) could not be found
    #[error("could not locate the current artifact: {0}")]
    CannotLocateCurrentArtifact(String),

    /// Filesystem failure during extraction or swap
    #[error("install failed: {0}")]
    InstallIo(String),

    /// External installer exited unsuccessfully
    #[error("installer exited with code {code:?}")]
    InstallerExitCode { code: Option<i32> },

    /// Relaunching the application failed
    #[error("restart failed: {0}")]
    Restart(String),

    /// Another operation is already running on this session
    #[error("another update operation is in progress")]
    SessionBusy,

    /// Operation not valid from the current phase
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Key material could not be decoded
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Downloaded file length differs from the advertised size
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Whether the error came from locating the installed artifact or bundle.
    pub fn is_location_error(&self) -> bool {
        matches!(
            self,
            UpdateError::NoBundleFound
                | UpdateError::BundleNotLocatable
                | UpdateError::CannotLocateCurrentArtifact(_)
        )
    }

    /// Whether the error is a signature enforcement failure.
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            UpdateError::SignatureMissing | UpdateError::SignatureInvalid
        )
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        UpdateError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for UpdateError {
    fn from(err: serde_json::Error) -> Self {
        UpdateError::Parse(err.to_string())
    }
}
