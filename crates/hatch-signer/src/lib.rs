//! hatch-signer - offline signing for update artifacts
//!
//! This crate provides a command-line interface for:
//! - Generating Ed25519 signing key pairs
//! - Signing release artifacts (writes `<artifact>.sig`)
//! - Verifying an artifact against a public key

pub mod cli;

pub use cli::Cli;

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error (bad arguments, unreadable files, malformed keys)
/// - 2: Signature did not verify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    VerificationFailed = 2,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }
}
