//! Platform and target detection.
//!
//! Manifests key their per-platform entries by target strings such as
//! `darwin-aarch64`. [`Target`] is the typed form of those keys and
//! [`Platform`] selects the installer.

use std::fmt;
use std::str::FromStr;

use crate::error::UpdateError;

/// Operating system family, used to pick a platform installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    /// Platform of the running process, if supported.
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self::MacOs)
        } else if cfg!(target_os = "windows") {
            Some(Self::Windows)
        } else if cfg!(target_os = "linux") {
            Some(Self::Linux)
        } else {
            None
        }
    }
}

/// A published build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    DarwinAarch64,
    DarwinX86_64,
    WindowsX86_64,
    LinuxX86_64,
    LinuxAarch64,
}

impl Target {
    /// Every target a manifest may address.
    pub const ALL: [Target; 5] = [
        Target::DarwinAarch64,
        Target::DarwinX86_64,
        Target::WindowsX86_64,
        Target::LinuxX86_64,
        Target::LinuxAarch64,
    ];

    /// The manifest key for this target.
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::DarwinAarch64 => "darwin-aarch64",
            Target::DarwinX86_64 => "darwin-x86_64",
            Target::WindowsX86_64 => "windows-x86_64",
            Target::LinuxX86_64 => "linux-x86_64",
            Target::LinuxAarch64 => "linux-aarch64",
        }
    }

    /// CPU architecture, as substituted for `{{arch}}` in endpoint templates.
    pub fn arch(&self) -> &'static str {
        match self {
            Target::DarwinAarch64 | Target::LinuxAarch64 => "aarch64",
            Target::DarwinX86_64 | Target::WindowsX86_64 | Target::LinuxX86_64 => "x86_64",
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Target::DarwinAarch64 | Target::DarwinX86_64 => Platform::MacOs,
            Target::WindowsX86_64 => Platform::Windows,
            Target::LinuxX86_64 | Target::LinuxAarch64 => Platform::Linux,
        }
    }

    /// Target of the running process, if it is one we publish for.
    pub fn current() -> Option<Self> {
        let os = Platform::current()?;
        let aarch64 = cfg!(target_arch = "aarch64");
        let x86_64 = cfg!(target_arch = "x86_64");

        match os {
            Platform::MacOs if aarch64 => Some(Target::DarwinAarch64),
            Platform::MacOs if x86_64 => Some(Target::DarwinX86_64),
            Platform::Windows if x86_64 => Some(Target::WindowsX86_64),
            Platform::Linux if x86_64 => Some(Target::LinuxX86_64),
            Platform::Linux if aarch64 => Some(Target::LinuxAarch64),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UpdateError::Config(format!("unknown target: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_strings_round_trip() {
        for target in Target::ALL {
            assert_eq!(target.as_str().parse::<Target>().unwrap(), target);
            assert_eq!(target.to_string(), target.as_str());
        }
    }

    #[test]
    fn test_unknown_target_rejected() {
        assert!("freebsd-x86_64".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
    }

    #[test]
    fn test_arch_and_platform() {
        assert_eq!(Target::DarwinAarch64.arch(), "aarch64");
        assert_eq!(Target::WindowsX86_64.arch(), "x86_64");
        assert_eq!(Target::LinuxAarch64.platform(), Platform::Linux);
        assert_eq!(Target::DarwinX86_64.platform(), Platform::MacOs);
    }

    #[test]
    fn test_current_target_matches_current_platform() {
        if let Some(target) = Target::current() {
            assert_eq!(Some(target.platform()), Platform::current());
        }
    }
}
