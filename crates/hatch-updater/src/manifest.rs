//! Update manifest model.
//!
//! An update endpoint answers with one of two JSON shapes:
//!
//! - **Multi-platform**: a shared `version`, `notes` and `pub_date` (also
//!   accepted as `publish_date`) plus a `platforms` map keyed by target
//!   string, each entry carrying its own `url`, `signature` and `size`.
//!   Entries are decoded lazily, so unknown targets may use any shape.
//! - **Simple**: a single artifact described with camelCase keys
//!   (`downloadUrl`, `releaseNotes`, `releaseDate`, `mandatory`, ...).
//!
//! A manifest is multi-platform iff its `platforms` map is non-empty.
//! Resolution never mixes fields from the two shapes, except that the
//! shared `notes`/`pub_date` act as fallbacks for the simple shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UpdateError;
use crate::platform::Target;

/// Per-target entry of a multi-platform manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEntry {
    pub url: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Single-artifact release of a simple manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleRelease {
    pub download_url: String,
    pub signature: Option<String>,
    pub size: u64,
    pub release_notes: Option<String>,
    pub release_date: Option<String>,
    pub mandatory: bool,
}

/// Which of the two wire shapes a manifest used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestKind {
    /// Raw per-target entries; only the requested target is decoded
    MultiPlatform(BTreeMap<String, serde_json::Value>),
    Simple(SimpleRelease),
}

/// A parsed update manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateManifest {
    pub version: String,
    /// Shared release notes (`notes`)
    pub notes: Option<String>,
    /// Shared publish date (`pub_date`)
    pub pub_date: Option<String>,
    pub kind: ManifestKind,
}

/// Wire form accepting both shapes. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default, alias = "publish_date")]
    pub_date: Option<String>,
    #[serde(default)]
    platforms: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "downloadUrl")]
    download_url: Option<String>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default, rename = "releaseNotes")]
    release_notes: Option<String>,
    #[serde(default, rename = "releaseDate")]
    release_date: Option<String>,
    #[serde(default)]
    mandatory: Option<bool>,
}

impl UpdateManifest {
    /// Parse a manifest from a response body.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Parse`] if the body is not JSON, has no
    /// `version`, or matches neither shape.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, UpdateError> {
        let raw: RawManifest = serde_json::from_slice(bytes)?;

        let version = raw
            .version
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| UpdateError::Parse("manifest has no version".to_string()))?;

        let kind = if !raw.platforms.is_empty() {
            ManifestKind::MultiPlatform(raw.platforms)
        } else if let Some(download_url) = raw.download_url {
            ManifestKind::Simple(SimpleRelease {
                download_url,
                signature: raw.signature,
                size: raw.size.unwrap_or(0),
                release_notes: raw.release_notes,
                release_date: raw.release_date,
                mandatory: raw.mandatory.unwrap_or(false),
            })
        } else {
            return Err(UpdateError::Parse(
                "manifest has neither platforms nor downloadUrl".to_string(),
            ));
        };

        Ok(Self {
            version,
            notes: raw.notes,
            pub_date: raw.pub_date,
            kind,
        })
    }

    /// Whether this manifest uses the multi-platform shape.
    pub fn is_multi_platform(&self) -> bool {
        matches!(self.kind, ManifestKind::MultiPlatform(_))
    }

    /// Resolve the update for `target`.
    ///
    /// Simple manifests ignore the target. Multi-platform manifests
    /// without an entry for it yield [`UpdateError::NoMatchingPlatform`],
    /// and a malformed entry for it yields [`UpdateError::Parse`]. Entries
    /// for other targets are never decoded.
    pub fn resolve_for(&self, target: Target) -> Result<UpdateInfo, UpdateError> {
        match &self.kind {
            ManifestKind::MultiPlatform(platforms) => {
                let raw = platforms.get(target.as_str()).ok_or_else(|| {
                    UpdateError::NoMatchingPlatform {
                        target: target.to_string(),
                    }
                })?;
                let entry: PlatformEntry = serde_json::from_value(raw.clone()).map_err(|e| {
                    UpdateError::Parse(format!("platform entry {}: {}", target, e))
                })?;
                Ok(UpdateInfo {
                    version: self.version.clone(),
                    release_notes: self.notes.clone(),
                    release_date: self.pub_date.clone(),
                    download_url: entry.url,
                    signature: non_empty(entry.signature.as_deref()),
                    size: entry.size,
                    mandatory: false,
                })
            }
            ManifestKind::Simple(release) => Ok(UpdateInfo {
                version: self.version.clone(),
                release_notes: release.release_notes.clone().or_else(|| self.notes.clone()),
                release_date: release.release_date.clone().or_else(|| self.pub_date.clone()),
                download_url: release.download_url.clone(),
                signature: non_empty(release.signature.as_deref()),
                size: release.size,
                mandatory: release.mandatory,
            }),
        }
    }

    /// Resolve the update for `target`, treating a missing platform entry
    /// as "nothing to install".
    pub fn resolve(&self, target: Target) -> Option<UpdateInfo> {
        match self.resolve_for(target) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Manifest {} does not resolve: {}", self.version, e);
                None
            }
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Outcome of an endpoint request that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestResponse {
    /// HTTP 204: the endpoint has nothing newer to offer
    NoContent,
    Manifest(UpdateManifest),
}

impl ManifestResponse {
    /// Interpret a successful (2xx) HTTP response.
    pub fn from_http(status: u16, body: &[u8]) -> Result<Self, UpdateError> {
        if status == 204 {
            return Ok(Self::NoContent);
        }
        UpdateManifest::from_slice(body).map(Self::Manifest)
    }
}

/// Normalized description of an available update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub version: String,
    pub release_notes: Option<String>,
    pub release_date: Option<String>,
    pub download_url: String,
    pub signature: Option<String>,
    /// Advertised artifact size in bytes, 0 when unknown
    pub size: u64,
    pub mandatory: bool,
}

impl UpdateInfo {
    /// File name of the artifact as published, used for the download path.
    pub fn artifact_file_name(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.download_url).ok()?;
        parsed
            .path_segments()?
            .filter(|s| !s.is_empty())
            .last()
            .map(str::to_string)
    }
}
