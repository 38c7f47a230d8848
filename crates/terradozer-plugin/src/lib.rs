//! Terraform provider plugin client for terradozer
//!
//! Launches a provider binary as a child process, performs the go-plugin
//! handshake and talks to it over gRPC using Terraform plugin protocol 5.
//! The connection is mutually authenticated with ephemeral certificates
//! whenever the plugin supports it (go-plugin AutoMTLS).
//!
//! # Lifecycle
//!
//! ```text
//! Unstarted ──▶ Launching ──▶ Ready ──▶ Terminated
//!                   │                       ▲
//!                   └───────────────────────┘  (handshake failed)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use terradozer_plugin::{PluginClient, PluginConfig};
//! use terradozer_provider::Provider;
//!
//! let client = PluginClient::launch(PluginConfig::new("aws", path)).await?;
//! let mut provider = Provider::new("aws", client);
//! provider.configure(&options).await?;
//! ```

pub mod client;
pub mod error;
pub mod grpc;
pub mod handshake;
pub mod msgpack;
pub mod process;
pub mod proto;
pub mod tls;

// Re-exports
pub use client::{PluginClient, PluginConfig};
pub use error::{PluginError, Result};
pub use handshake::{Handshake, PluginAddress, SUPPORTED_PROTOCOL_VERSIONS};
pub use process::{PluginProcess, PluginState};
pub use tls::PluginCertificate;
