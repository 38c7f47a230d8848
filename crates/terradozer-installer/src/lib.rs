//! Terraform provider installation for terradozer
//!
//! Resolves a provider name and version constraint to an executable plugin
//! binary on disk, downloading it from a Terraform registry when needed.
//!
//! ```text
//! <install_dir>/
//! ├── plugins/registry.terraform.io/hashicorp/aws/2.43.0/linux_amd64/
//! │   └── terraform-provider-aws_v2.43.0_x4
//! └── cache/registry.terraform.io/hashicorp/aws/2.43.0/linux_amd64/
//!     └── terraform-provider-aws_v2.43.0_x4
//! ```

pub mod archive;
pub mod constraint;
pub mod error;
pub mod installer;
pub mod platform;
pub mod registry;

// Re-exports
pub use constraint::VersionConstraint;
pub use error::{InstallError, Result};
pub use installer::{Installer, PluginInstallation, PROTOCOL_VERSION};
pub use platform::Platform;
pub use registry::{DEFAULT_NAMESPACE, DEFAULT_REGISTRY_HOST, RegistryClient};
