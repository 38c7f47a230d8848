//! Errors that abort a destroy run

use crate::factory::BoxError;
use terradozer_state::StateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("failed to decode ID of resource {address}: {source}")]
    ResourceId {
        address: String,
        #[source]
        source: StateError,
    },

    #[error("failed to set up provider {provider}: {source}")]
    ProviderSetup {
        provider: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
