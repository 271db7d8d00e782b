//! OS process primitives used by the installers.
//!
//! Installers never touch `std::process` directly so that install and
//! restart flows can be exercised with a recording launcher in tests.

use std::ffi::OsString;
use std::io;
use std::process::{Command, Stdio};

use tracing::debug;

/// Starts external programs on behalf of an installer.
pub trait ProcessLauncher: Send + Sync {
    /// Start `program` detached and return without waiting.
    fn spawn(&self, program: &OsString, args: &[OsString]) -> io::Result<()>;

    /// Run `program` to completion and return its exit code.
    ///
    /// `None` means the process was terminated by a signal.
    fn run(&self, program: &OsString, args: &[OsString]) -> io::Result<Option<i32>>;
}

/// [`ProcessLauncher`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn spawn(&self, program: &OsString, args: &[OsString]) -> io::Result<()> {
        debug!("Spawning {:?} {:?}", program, args);
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }

    fn run(&self, program: &OsString, args: &[OsString]) -> io::Result<Option<i32>> {
        debug!("Running {:?} {:?}", program, args);
        let status = Command::new(program).args(args).status()?;
        Ok(status.code())
    }
}

/// Arguments the current process was started with, minus the program name.
pub fn current_args() -> Vec<OsString> {
    std::env::args_os().skip(1).collect()
}
