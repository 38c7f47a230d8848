//! Provider construction seam

use async_trait::async_trait;
use terradozer_provider::Provider;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Creates a ready-to-use [`Provider`] for a provider name.
///
/// Called at most once per name and run. `Ok(None)` means the provider is
/// not supported and its resources are skipped; an error aborts the run.
#[async_trait]
pub trait ProviderFactory: Send {
    async fn create(&mut self, name: &str) -> Result<Option<Provider>, BoxError>;
}
