//! Config file schema

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Providers terradozer knows how to install without any configuration,
/// as (name, version constraint)
pub const BUILTIN_PROVIDERS: &[(&str, &str)] = &[("aws", "2.43.0")];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root for installed plugins and the download cache
    pub install_dir: PathBuf,
    pub use_cache: bool,
    pub handshake_timeout_secs: u64,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::from(".terradozer"),
            use_cache: true,
            handshake_timeout_secs: 60,
            providers: BTreeMap::new(),
        }
    }
}

/// Per-provider settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Terraform-style version constraint
    pub version: Option<String>,
    /// Local plugin binary; the registry is not contacted when set
    pub path: Option<PathBuf>,
    /// Provider configuration values
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        // an empty file deserializes as null
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.install_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("install_dir must not be empty".to_string()));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Settings for provider `name`.
    ///
    /// Entries from the config file take precedence over the built-in table;
    /// a built-in version is kept when the file entry omits one. `None`
    /// means terradozer does not support the provider.
    pub fn provider(&self, name: &str) -> Option<ProviderConfig> {
        let builtin = BUILTIN_PROVIDERS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, version)| version.to_string());

        match (self.providers.get(name), builtin) {
            (Some(configured), builtin) => {
                let mut provider = configured.clone();
                if provider.version.is_none() {
                    provider.version = builtin;
                }
                Some(provider)
            }
            (None, Some(version)) => Some(ProviderConfig {
                version: Some(version),
                ..Default::default()
            }),
            (None, None) => None,
        }
    }
}
