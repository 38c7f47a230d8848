//! Target platform in registry notation

use crate::error::{InstallError, Result};
use std::fmt;

/// An `<os>_<arch>` pair as used by provider releases, e.g. `linux_amd64`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform terradozer is running on
    pub fn current() -> Result<Self> {
        Self::from_rust(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn from_rust(os: &str, arch: &str) -> Result<Self> {
        let os = match os {
            "macos" => "darwin",
            "linux" | "windows" | "freebsd" | "openbsd" | "solaris" => os,
            _ => return Err(InstallError::UnsupportedPlatform(format!("{}-{}", os, arch))),
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "x86" => "386",
            "aarch64" => "arm64",
            "arm" => "arm",
            _ => return Err(InstallError::UnsupportedPlatform(format!("{}-{}", os, arch))),
        };
        Ok(Self::new(os, arch))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rust target names map to registry os_arch pairs
    #[test]
    fn test_rust_to_registry_names() {
        assert_eq!(Platform::from_rust("linux", "x86_64").unwrap().to_string(), "linux_amd64");
        assert_eq!(Platform::from_rust("macos", "aarch64").unwrap().to_string(), "darwin_arm64");
        assert_eq!(Platform::from_rust("windows", "x86").unwrap().to_string(), "windows_386");
        assert!(Platform::from_rust("linux", "riscv64").is_err());
        assert!(Platform::from_rust("haiku", "x86_64").is_err());
    }
}
