//! Provider error types

use crate::diagnostics::Diagnostics;
use thiserror::Error;

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to configure provider {provider}: {diagnostics}")]
    Configure {
        provider: String,
        diagnostics: Diagnostics,
    },

    #[error("provider {provider} does not recognize configuration option '{option}'")]
    UnknownOption { provider: String, option: String },

    #[error("failed to import resource (type={resource_type}, id={id}): {diagnostics}")]
    Import {
        resource_type: String,
        id: String,
        diagnostics: Diagnostics,
    },

    #[error("failed to read resource (type={resource_type}): {diagnostics}")]
    Read {
        resource_type: String,
        diagnostics: Diagnostics,
    },

    #[error("failed to delete resource (type={resource_type}): {diagnostics}")]
    Apply {
        resource_type: String,
        diagnostics: Diagnostics,
    },

    #[error("provider call failed: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
