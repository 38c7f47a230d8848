//! Provider factory backed by real plugin binaries

use async_trait::async_trait;
use std::collections::BTreeMap;
use terradozer_config::{Config, ProviderConfig};
use terradozer_core::{BoxError, ProviderFactory};
use terradozer_installer::{InstallError, Installer, PluginInstallation, VersionConstraint};
use terradozer_plugin::{PluginClient, PluginConfig};
use terradozer_provider::{Provider, Value};

/// Installs, launches and configures the providers a state file refers to
pub struct PluginProviderFactory {
    config: Config,
    /// Created on the first registry install
    installer: Option<Installer>,
}

impl PluginProviderFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            installer: None,
        }
    }

    fn installer(&mut self) -> Result<&Installer, InstallError> {
        let installer = match self.installer.take() {
            Some(installer) => installer,
            None => Installer::new(&self.config.install_dir)?.with_cache(self.config.use_cache),
        };
        Ok(self.installer.insert(installer))
    }

    async fn install(
        &mut self,
        name: &str,
        settings: &ProviderConfig,
    ) -> Result<PluginInstallation, InstallError> {
        if let Some(path) = &settings.path {
            return PluginInstallation::local(name, path);
        }

        let constraint = match settings.version.as_deref() {
            Some(version) => VersionConstraint::parse(version)?,
            None => VersionConstraint::any(),
        };
        self.installer()?.install(name, &constraint).await
    }
}

#[async_trait]
impl ProviderFactory for PluginProviderFactory {
    async fn create(&mut self, name: &str) -> Result<Option<Provider>, BoxError> {
        let Some(settings) = self.config.provider(name) else {
            return Ok(None);
        };

        let installation = self.install(name, &settings).await?;
        tracing::debug!(
            "launching provider {} from {}",
            name,
            installation.path.display()
        );

        let client = PluginClient::launch(
            PluginConfig::new(name, &installation.path)
                .with_protocol_version(installation.protocol_version)
                .with_handshake_timeout(self.config.handshake_timeout()),
        )
        .await?;

        let options: BTreeMap<String, Value> = settings
            .options
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect();

        let mut provider = Provider::new(name, client);
        if let Err(err) = provider.configure(&options).await {
            // the plugin process is already running
            let _ = provider.shutdown().await;
            return Err(err.into());
        }

        match &installation.version {
            Some(version) => tracing::info!("configured provider {} v{}", name, version),
            None => tracing::info!("configured provider {}", name),
        }
        Ok(Some(provider))
    }
}
