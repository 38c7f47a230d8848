//! State reader error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or interpreting a state snapshot
#[derive(Error, Debug)]
pub enum StateError {
    #[error("State file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported state file version {found} (supported: {supported})")]
    UnsupportedVersion { found: u64, supported: u64 },

    #[error("Failed to parse state file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    Invalid(String),

    #[error("Duplicate resource instance address in state: {0}")]
    DuplicateAddress(String),

    #[error("Resource instance attributes have no 'id' field")]
    MissingId,

    #[error("Failed to decode resource ID: {0}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;
