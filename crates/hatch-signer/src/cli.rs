//! CLI command definitions and argument parsing

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use hatch_updater::signature;
use tracing::{debug, info};

use crate::ExitCode;

/// Environment variable holding the base64 private key for `sign`.
pub const PRIVATE_KEY_ENV: &str = "HATCH_SIGNING_PRIVATE_KEY";

/// hatch-signer - sign and verify update artifacts
#[derive(Parser, Debug)]
#[command(name = "hatch-signer")]
#[command(version, about = "Generate update signing keys, sign and verify artifacts")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a new Ed25519 key pair
    Generate(GenerateArgs),
    /// Sign an artifact and write `<artifact>.sig`
    Sign(SignArgs),
    /// Verify an artifact signature
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Write the private key to PATH and the public key to PATH.pub
    #[arg(long, value_name = "PATH")]
    pub write_keys: Option<PathBuf>,

    /// Overwrite existing key files
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Artifact to sign
    pub artifact: PathBuf,

    /// Base64 private key
    #[arg(long, env = "HATCH_SIGNING_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// File containing the base64 private key (takes precedence)
    #[arg(long, value_name = "PATH")]
    pub private_key_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Artifact to verify
    pub artifact: PathBuf,

    /// Base64 public key
    #[arg(long, required_unless_present = "private_key")]
    pub public_key: Option<String>,

    /// Derive the public key from this base64 private key instead
    #[arg(long, conflicts_with = "public_key")]
    pub private_key: Option<String>,

    /// Base64 signature (default: read `<artifact>.sig`)
    #[arg(long)]
    pub signature: Option<String>,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Commands::Generate(args) => args.execute(),
            Commands::Sign(args) => args.execute(),
            Commands::Verify(args) => args.execute(),
        }
    }
}

impl GenerateArgs {
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        let keys = signature::generate_keypair();

        if let Some(path) = &self.write_keys {
            let public_path = public_key_path(path);
            for existing in [path, &public_path] {
                if existing.exists() && !self.force {
                    bail!(
                        "{} already exists (use --force to overwrite)",
                        existing.display()
                    );
                }
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            write_private_key(path, &keys.private_key_base64)?;
            fs::write(&public_path, &keys.public_key_base64)
                .with_context(|| format!("writing {}", public_path.display()))?;
            info!(private = %path.display(), public = %public_path.display(), "Wrote key pair");
        }

        println!("Public key: {}", keys.public_key_base64);
        println!("Private key: {}", keys.private_key_base64);
        Ok(ExitCode::Success)
    }
}

impl SignArgs {
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        let private_key = match (&self.private_key_path, &self.private_key) {
            (Some(path), _) => fs::read_to_string(path)
                .with_context(|| format!("reading private key from {}", path.display()))?
                .trim()
                .to_string(),
            (None, Some(key)) => key.trim().to_string(),
            (None, None) => bail!(
                "no private key: pass --private-key, --private-key-path or set {}",
                PRIVATE_KEY_ENV
            ),
        };

        let sig = signature::sign_file(&self.artifact, &private_key)
            .with_context(|| format!("signing {}", self.artifact.display()))?;
        let sig_path = signature::write_signature_file(&self.artifact, &sig)?;
        info!(artifact = %self.artifact.display(), signature = %sig_path.display(), "Signed artifact");

        println!("{}", sig);
        Ok(ExitCode::Success)
    }
}

impl VerifyArgs {
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        let public_key = match (&self.public_key, &self.private_key) {
            (Some(key), _) => key.trim().to_string(),
            (None, Some(private)) => signature::public_key_from_private(private)?,
            (None, None) => bail!("pass --public-key or --private-key"),
        };

        let sig = match &self.signature {
            Some(sig) => sig.trim().to_string(),
            None => signature::read_signature_file(&self.artifact).with_context(|| {
                format!(
                    "reading {}",
                    signature::signature_path(&self.artifact).display()
                )
            })?,
        };

        let bytes = fs::read(&self.artifact)
            .with_context(|| format!("reading {}", self.artifact.display()))?;
        debug!(len = bytes.len(), "Verifying artifact");

        if signature::verify(&bytes, &sig, &public_key) {
            println!("Signature valid");
            Ok(ExitCode::Success)
        } else {
            println!("Signature INVALID");
            Ok(ExitCode::VerificationFailed)
        }
    }
}

fn public_key_path(private_path: &Path) -> PathBuf {
    let mut name = private_path.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

fn write_private_key(path: &Path, key: &str) -> anyhow::Result<()> {
    fs::write(path, key).with_context(|| format!("writing {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting permissions on {}", path.display()))?;
    }
    Ok(())
}
