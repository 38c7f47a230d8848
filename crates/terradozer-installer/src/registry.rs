//! Terraform provider registry client
//!
//! Implements the two calls of the provider registry protocol terradozer
//! needs: listing available versions and resolving a download for one
//! version and platform.

use crate::error::{InstallError, Result};
use crate::platform::Platform;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";
pub const DEFAULT_NAMESPACE: &str = "hashicorp";

const USER_AGENT: &str = concat!("terradozer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct VersionList {
    #[serde(default)]
    versions: Vec<AvailableVersion>,
}

/// One entry of the registry's version list
#[derive(Debug, Clone, Deserialize)]
pub struct AvailableVersion {
    pub version: String,
    #[serde(default)]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<RegistryPlatform>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryPlatform {
    pub os: String,
    pub arch: String,
}

impl AvailableVersion {
    /// Whether any advertised protocol has the given major version
    pub fn supports_protocol(&self, major: u32) -> bool {
        supports_protocol(&self.protocols, major)
    }

    /// Whether a build exists for `platform`; an empty list is not trusted
    /// to mean "none"
    pub fn supports_platform(&self, platform: &Platform) -> bool {
        self.platforms.is_empty()
            || self
                .platforms
                .iter()
                .any(|p| p.os == platform.os && p.arch == platform.arch)
    }
}

/// Download location of one provider release archive
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadInfo {
    #[serde(default)]
    pub protocols: Vec<String>,
    pub os: String,
    pub arch: String,
    pub filename: String,
    pub download_url: String,
    /// Hex SHA-256 of the archive
    pub shasum: String,
}

pub(crate) fn supports_protocol(protocols: &[String], major: u32) -> bool {
    protocols.iter().any(|p| {
        p.split('.')
            .next()
            .and_then(|m| m.trim().parse::<u32>().ok())
            == Some(major)
    })
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    host: String,
    base_url: String,
}

impl RegistryClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(
            DEFAULT_REGISTRY_HOST,
            format!("https://{}/v1/providers", DEFAULT_REGISTRY_HOST),
        )
    }

    /// Use a registry at `base_url` (the providers API root), recorded as `host`
    /// in the install layout
    pub fn with_base_url(host: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            host: host.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn versions(&self, namespace: &str, name: &str) -> Result<Vec<AvailableVersion>> {
        let url = format!("{}/{}/{}/versions", self.base_url, namespace, name);
        let list: VersionList = self.get_json(&url).await?;
        Ok(list.versions)
    }

    pub async fn download_info(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
        platform: &Platform,
    ) -> Result<DownloadInfo> {
        let url = format!(
            "{}/{}/{}/{}/download/{}/{}",
            self.base_url, namespace, name, version, platform.os, platform.arch
        );
        self.get_json(&url).await
    }

    /// Fetch a release archive
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("downloading {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(InstallError::Registry {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(InstallError::Registry {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json().await?)
    }
}
