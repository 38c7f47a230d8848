//! Provider installation

use crate::archive::{extract_provider, find_provider_binary, make_executable, verify_sha256};
use crate::constraint::VersionConstraint;
use crate::error::{InstallError, Result};
use crate::platform::Platform;
use crate::registry::{AvailableVersion, DEFAULT_NAMESPACE, RegistryClient, supports_protocol};
use semver::Version;
use std::fs;
use std::path::{Path, PathBuf};

/// Plugin protocol major version terradozer speaks
pub const PROTOCOL_VERSION: u32 = 5;

const PLUGINS_DIR: &str = "plugins";
const CACHE_DIR: &str = "cache";

/// An installed provider ready to be launched
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInstallation {
    pub name: String,
    /// `None` for a binary supplied by path
    pub version: Option<Version>,
    pub path: PathBuf,
    pub protocol_version: u32,
}

impl PluginInstallation {
    /// Record for a provider binary at a user-supplied path
    pub fn local(name: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(InstallError::MissingBinary {
                provider: name.to_string(),
                dir: path,
            });
        }
        Ok(Self {
            name: name.to_string(),
            version: None,
            path,
            protocol_version: PROTOCOL_VERSION,
        })
    }
}

pub struct Installer {
    install_dir: PathBuf,
    use_cache: bool,
    namespace: String,
    platform: Platform,
    registry: RegistryClient,
}

impl Installer {
    /// Installer for the current platform using the public registry
    pub fn new(install_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            install_dir: install_dir.into(),
            use_cache: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            platform: Platform::current()?,
            registry: RegistryClient::new()?,
        })
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_registry(mut self, registry: RegistryClient) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    fn layout_dir(&self, root: &str, name: &str, version: &Version) -> PathBuf {
        self.install_dir
            .join(root)
            .join(self.registry.host())
            .join(&self.namespace)
            .join(name)
            .join(version.to_string())
            .join(self.platform.to_string())
    }

    fn installation(&self, name: &str, version: Version, path: PathBuf) -> PluginInstallation {
        PluginInstallation {
            name: name.to_string(),
            version: Some(version),
            path,
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// Versions of `name` already installed for this platform
    pub fn installed_versions(&self, name: &str) -> Vec<Version> {
        let dir = self
            .install_dir
            .join(PLUGINS_DIR)
            .join(self.registry.host())
            .join(&self.namespace)
            .join(name);
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };

        let mut versions: Vec<Version> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().and_then(|v| Version::parse(v).ok()))
            .filter(|v| find_provider_binary(&self.layout_dir(PLUGINS_DIR, name, v), name).is_some())
            .collect();
        versions.sort();
        versions
    }

    /// Newest installed version of `name` satisfying `constraint`
    pub fn find_installed(
        &self,
        name: &str,
        constraint: &VersionConstraint,
    ) -> Option<PluginInstallation> {
        let version = self
            .installed_versions(name)
            .into_iter()
            .filter(|v| constraint.matches(v))
            .max()?;
        let path = find_provider_binary(&self.layout_dir(PLUGINS_DIR, name, &version), name)?;
        Some(self.installation(name, version, path))
    }

    /// Make the newest version of `name` matching `constraint` available on
    /// disk and return where it is.
    pub async fn install(
        &self,
        name: &str,
        constraint: &VersionConstraint,
    ) -> Result<PluginInstallation> {
        let available = match self.registry.versions(&self.namespace, name).await {
            Ok(available) => available,
            Err(err) if err.is_registry_unavailable() => {
                if let Some(installed) = self.find_installed(name, constraint) {
                    tracing::warn!(
                        "provider registry unavailable ({}), using installed {} {}",
                        err,
                        name,
                        installed
                            .version
                            .as_ref()
                            .map(Version::to_string)
                            .unwrap_or_default()
                    );
                    return Ok(installed);
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let version = select_version(&available, constraint, &self.platform).ok_or_else(|| {
            InstallError::NoMatchingVersion {
                provider: name.to_string(),
                constraint: constraint.to_string(),
                platform: self.platform.to_string(),
            }
        })?;

        let dir = self.layout_dir(PLUGINS_DIR, name, &version);
        if let Some(path) = find_provider_binary(&dir, name) {
            tracing::debug!("provider {} {} already installed", name, version);
            return Ok(self.installation(name, version, path));
        }

        let cache_dir = self.layout_dir(CACHE_DIR, name, &version);
        if self.use_cache
            && let Some(cached) = find_provider_binary(&cache_dir, name)
        {
            tracing::debug!("installing provider {} {} from cache", name, version);
            let path = copy_into(&cached, &dir)?;
            return Ok(self.installation(name, version, path));
        }

        let info = self
            .registry
            .download_info(&self.namespace, name, &version.to_string(), &self.platform)
            .await?;
        if !supports_protocol(&info.protocols, PROTOCOL_VERSION) {
            return Err(InstallError::NoMatchingVersion {
                provider: name.to_string(),
                constraint: format!("={} (protocols {:?})", version, info.protocols),
                platform: self.platform.to_string(),
            });
        }

        tracing::info!("downloading provider {} {} ({})", name, version, self.platform);
        let data = self.registry.download(&info.download_url).await?;
        verify_sha256(&info.filename, &data, &info.shasum)?;

        if self.use_cache {
            extract_provider(&data, name, &cache_dir)?;
        }
        let path = extract_provider(&data, name, &dir)?;
        tracing::info!("installed provider {} {}", name, version);

        Ok(self.installation(name, version, path))
    }
}

/// Pick the newest registry version that matches the constraint, speaks
/// the supported protocol and has a build for `platform`
pub(crate) fn select_version(
    available: &[AvailableVersion],
    constraint: &VersionConstraint,
    platform: &Platform,
) -> Option<Version> {
    available
        .iter()
        .filter(|v| v.supports_protocol(PROTOCOL_VERSION) && v.supports_platform(platform))
        .filter_map(|v| Version::parse(&v.version).ok())
        .filter(|v| constraint.matches(v))
        .max()
}

fn copy_into(source: &Path, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let file_name = source.file_name().ok_or_else(|| InstallError::MissingBinary {
        provider: source.display().to_string(),
        dir: dir.to_path_buf(),
    })?;
    let target = dir.join(file_name);
    fs::copy(source, &target)?;
    make_executable(&target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn available(version: &str, protocols: &[&str]) -> AvailableVersion {
        AvailableVersion {
            version: version.to_string(),
            protocols: protocols.iter().map(|p| p.to_string()).collect(),
            platforms: Vec::new(),
        }
    }

    /// Installer whose registry refuses connections
    fn offline_installer(dir: &Path) -> Installer {
        let registry =
            RegistryClient::with_base_url("registry.terraform.io", "http://127.0.0.1:9/v1/providers")
                .unwrap();
        Installer::new(dir)
            .unwrap()
            .with_registry(registry)
            .with_platform(Platform::new("linux", "amd64"))
    }

    fn fake_install(dir: &Path, version: &str) -> PathBuf {
        let plugin_dir = dir
            .join("plugins/registry.terraform.io/hashicorp/aws")
            .join(version)
            .join("linux_amd64");
        fs::create_dir_all(&plugin_dir).unwrap();
        let path = plugin_dir.join(format!("terraform-provider-aws_v{}_x4", version));
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        path
    }

    /// The newest version matching the constraint and protocol 5 wins
    #[test]
    fn test_select_newest_protocol_5_version() {
        let versions = vec![
            available("2.43.0", &["4.0", "5.1"]),
            available("2.70.0", &["4.0", "5.1"]),
            available("3.0.0", &["5.0"]),
            available("1.60.0", &["4.0"]),
            available("not-a-version", &["5.0"]),
        ];
        let linux = Platform::new("linux", "amd64");

        let any = VersionConstraint::any();
        assert_eq!(select_version(&versions, &any, &linux), Some(Version::new(3, 0, 0)));

        let pinned = VersionConstraint::parse("~> 2.43").unwrap();
        assert_eq!(select_version(&versions, &pinned, &linux), Some(Version::new(2, 70, 0)));

        let old = VersionConstraint::parse("< 2.0").unwrap();
        assert_eq!(select_version(&versions, &old, &linux), None);
    }

    /// A configured binary path is used as is
    #[test]
    fn test_local_installation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("terraform-provider-aws");
        fs::write(&path, b"bin").unwrap();

        let record = PluginInstallation::local("aws", &path).unwrap();
        assert_eq!(record.path, path);
        assert_eq!(record.version, None);
        assert_eq!(record.protocol_version, 5);

        assert!(PluginInstallation::local("aws", dir.path().join("missing")).is_err());
    }

    /// Only version directories holding a binary count as installed
    #[test]
    fn test_installed_versions() {
        let dir = TempDir::new().unwrap();
        fake_install(dir.path(), "2.43.0");
        fake_install(dir.path(), "2.70.0");
        // a version directory without a binary does not count
        fs::create_dir_all(
            dir.path()
                .join("plugins/registry.terraform.io/hashicorp/aws/3.0.0/linux_amd64"),
        )
        .unwrap();

        let installer = offline_installer(dir.path());
        assert_eq!(
            installer.installed_versions("aws"),
            vec![Version::new(2, 43, 0), Version::new(2, 70, 0)]
        );

        let found = installer
            .find_installed("aws", &VersionConstraint::parse("2.43.0").unwrap())
            .unwrap();
        assert_eq!(found.version, Some(Version::new(2, 43, 0)));
    }

    /// Without the registry an installed matching version is used
    #[tokio::test]
    async fn test_offline_falls_back_to_installed_version() {
        let dir = TempDir::new().unwrap();
        let path = fake_install(dir.path(), "2.43.0");
        let installer = offline_installer(dir.path());

        let record = installer
            .install("aws", &VersionConstraint::parse("~> 2.0").unwrap())
            .await
            .unwrap();
        assert_eq!(record.path, path);
        assert_eq!(record.version, Some(Version::new(2, 43, 0)));
    }

    /// Without the registry and nothing installed the install fails
    #[tokio::test]
    async fn test_offline_without_installed_version_fails() {
        let dir = TempDir::new().unwrap();
        fake_install(dir.path(), "1.60.0");
        let installer = offline_installer(dir.path());

        let err = installer
            .install("aws", &VersionConstraint::parse(">= 2.0").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_registry_unavailable());
    }

    /// A binary in the plugin cache is copied instead of downloaded
    #[test]
    fn test_copy_from_cache() {
        let dir = TempDir::new().unwrap();
        let cached = dir.path().join("cache/terraform-provider-aws_v2.43.0_x4");
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"bin").unwrap();

        let target = copy_into(&cached, &dir.path().join("plugins")).unwrap();
        assert_eq!(fs::read(target).unwrap(), b"bin");
    }
}
