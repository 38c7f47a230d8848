//! Installer error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("invalid version constraint {constraint:?}: {message}")]
    InvalidConstraint { constraint: String, message: String },

    #[error("no version of provider {provider} matches constraint {constraint:?} for {platform}")]
    NoMatchingVersion {
        provider: String,
        constraint: String,
        platform: String,
    },

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry returned {status} for {url}")]
    Registry { status: u16, url: String },

    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("invalid provider archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("provider binary for {provider} not found in {}", dir.display())]
    MissingBinary { provider: String, dir: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    /// Whether the registry could not be reached or answered with an error
    pub fn is_registry_unavailable(&self) -> bool {
        match self {
            InstallError::Http(_) => true,
            InstallError::Registry { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, InstallError>;
