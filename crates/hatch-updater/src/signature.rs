//! Ed25519 artifact signing and verification.
//!
//! Keys and signatures travel as standard-alphabet base64: the private key
//! is the 32-byte seed, the public key the 32-byte compressed point and the
//! signature the 64-byte Ed25519 signature over the whole artifact.
//!
//! Signing happens offline at build time (see the `hatch-signer` tool);
//! verification happens in the running application after download.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;
use tracing::{debug, warn};

use crate::error::UpdateError;

/// Extension appended to an artifact path for its detached signature.
pub const SIGNATURE_EXTENSION: &str = "sig";

/// A freshly generated key pair, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningKeyPair {
    pub public_key_base64: String,
    pub private_key_base64: String,
}

/// Generate a new Ed25519 key pair from the OS random source.
///
/// Nothing is persisted; callers decide where the private key lives.
pub fn generate_keypair() -> SigningKeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    SigningKeyPair {
        public_key_base64: STANDARD.encode(signing_key.verifying_key().as_bytes()),
        private_key_base64: STANDARD.encode(signing_key.to_bytes()),
    }
}

/// Sign `bytes` with a base64 private key seed.
///
/// Ed25519 is deterministic: the same input and key always yield the same
/// signature.
pub fn sign(bytes: &[u8], private_key_b64: &str) -> Result<String, UpdateError> {
    let signing_key = signing_key_from_base64(private_key_b64)?;
    let signature = signing_key.sign(bytes);
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// Verify `signature_b64` over `bytes` against `public_key_b64`.
///
/// Never fails loudly: malformed base64, wrong lengths, invalid points and
/// non-matching signatures all yield `false`.
pub fn verify(bytes: &[u8], signature_b64: &str, public_key_b64: &str) -> bool {
    let Some(key_bytes) = decode_fixed::<32>(public_key_b64) else {
        debug!("Public key is not 32 bytes of base64");
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        debug!("Public key is not a valid Ed25519 point");
        return false;
    };
    let Some(sig_bytes) = decode_fixed::<64>(signature_b64) else {
        debug!("Signature is not 64 bytes of base64");
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key.verify_strict(bytes, &signature).is_ok()
}

/// Derive the base64 public key from a base64 private key seed.
pub fn public_key_from_private(private_key_b64: &str) -> Result<String, UpdateError> {
    let signing_key = signing_key_from_base64(private_key_b64)?;
    Ok(STANDARD.encode(signing_key.verifying_key().as_bytes()))
}

/// Check that a base64 public key decodes to a usable Ed25519 key.
pub fn validate_public_key(public_key_b64: &str) -> Result<(), UpdateError> {
    let bytes = decode_fixed::<32>(public_key_b64).ok_or_else(|| {
        UpdateError::InvalidKey("public key must be 32 bytes of base64".to_string())
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map(|_| ())
        .map_err(|e| UpdateError::InvalidKey(e.to_string()))
}

/// Sign the contents of a file.
pub fn sign_file(path: &Path, private_key_b64: &str) -> Result<String, UpdateError> {
    let bytes = fs::read(path)?;
    debug!(path = %path.display(), len = bytes.len(), "Signing artifact");
    sign(&bytes, private_key_b64)
}

/// Path of the detached signature for `artifact` (`<artifact>.sig`).
pub fn signature_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(".");
    name.push(SIGNATURE_EXTENSION);
    PathBuf::from(name)
}

/// Write `signature` next to `artifact` as plain base64 text.
pub fn write_signature_file(artifact: &Path, signature: &str) -> Result<PathBuf, UpdateError> {
    let path = signature_path(artifact);
    fs::write(&path, signature)?;
    Ok(path)
}

/// Read the detached signature for `artifact`, trimmed of whitespace.
pub fn read_signature_file(artifact: &Path) -> Result<String, UpdateError> {
    let content = fs::read_to_string(signature_path(artifact))?;
    Ok(content.trim().to_string())
}

/// Result of applying the signature policy to an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Signature checked against the configured key
    Verified,
    /// No public key configured, artifact accepted without checking
    Unverified,
}

/// Apply the signature policy to a downloaded artifact.
///
/// | public key | signature | outcome |
/// |---|---|---|
/// | yes | valid | `Verified` |
/// | yes | invalid | `SignatureInvalid` |
/// | yes | absent | `SignatureMissing` |
/// | no | any | `Unverified` |
pub fn enforce(
    bytes: &[u8],
    signature: Option<&str>,
    public_key: Option<&str>,
) -> Result<Verification, UpdateError> {
    let Some(public_key) = public_key else {
        warn!("No public key configured; accepting update without signature verification");
        return Ok(Verification::Unverified);
    };

    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(UpdateError::SignatureMissing)?;

    if verify(bytes, signature, public_key) {
        Ok(Verification::Verified)
    } else {
        Err(UpdateError::SignatureInvalid)
    }
}

fn signing_key_from_base64(private_key_b64: &str) -> Result<SigningKey, UpdateError> {
    let seed = decode_fixed::<32>(private_key_b64).ok_or_else(|| {
        UpdateError::InvalidKey("private key must be 32 bytes of base64".to_string())
    })?;
    Ok(SigningKey::from_bytes(&seed))
}

fn decode_fixed<const N: usize>(b64: &str) -> Option<[u8; N]> {
    let bytes = STANDARD.decode(b64.trim()).ok()?;
    bytes.try_into().ok()
}
