//! go-plugin handshake
//!
//! A provider binary only starts serving when it finds the magic cookie in
//! its environment. Once its gRPC server is listening it prints a single line
//! to stdout:
//!
//! ```text
//! CORE-PROTOCOL-VERSION|APP-PROTOCOL-VERSION|NETWORK-TYPE|NETWORK-ADDR|PROTOCOL
//! 1|5|unix|/tmp/plugin123456|grpc
//! ```
//!
//! When the plugin was handed a client certificate in `PLUGIN_CLIENT_CERT`
//! a sixth field carries its own server certificate (base64 DER), which the
//! client pins for the TLS channel.

use crate::error::{PluginError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the magic cookie
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";

/// Magic cookie shared by Terraform core and every provider
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// go-plugin core protocol version
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Terraform plugin protocol versions this client speaks
pub const SUPPORTED_PROTOCOL_VERSIONS: &[u32] = &[5];

/// Port range offered to plugins listening on TCP (non-unix platforms)
pub const PLUGIN_MIN_PORT: u16 = 10000;
pub const PLUGIN_MAX_PORT: u16 = 25000;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Client certificate (PEM) the plugin must require from its peer
pub const CLIENT_CERT_KEY: &str = "PLUGIN_CLIENT_CERT";

/// Directory the plugin creates its unix socket in
pub const UNIX_SOCKET_DIR_KEY: &str = "PLUGIN_UNIX_SOCKET_DIR";

/// Environment the plugin process is started with
pub fn plugin_env(
    protocol_version: u32,
    client_cert_pem: Option<&str>,
    socket_dir: Option<&Path>,
) -> Vec<(&'static str, String)> {
    let mut env = vec![
        (MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE.to_string()),
        ("PLUGIN_PROTOCOL_VERSIONS", protocol_version.to_string()),
        ("PLUGIN_MIN_PORT", PLUGIN_MIN_PORT.to_string()),
        ("PLUGIN_MAX_PORT", PLUGIN_MAX_PORT.to_string()),
    ];
    if let Some(pem) = client_cert_pem {
        env.push((CLIENT_CERT_KEY, pem.to_string()));
    }
    if let Some(dir) = socket_dir {
        env.push((UNIX_SOCKET_DIR_KEY, dir.display().to_string()));
    }
    env
}

/// Where the plugin's gRPC server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginAddress {
    Unix(PathBuf),
    Tcp(String),
}

impl fmt::Display for PluginAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginAddress::Unix(path) => write!(f, "unix:{}", path.display()),
            PluginAddress::Tcp(addr) => write!(f, "tcp:{}", addr),
        }
    }
}

/// A parsed handshake line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u32,
    pub address: PluginAddress,
    pub server_cert: Option<String>,
}

impl Handshake {
    /// Parse and validate a handshake line against the negotiated
    /// `protocol_version`.
    pub fn parse(line: &str, protocol_version: u32) -> Result<Self> {
        let line = line.trim();
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 4 {
            return Err(PluginError::Handshake(format!(
                "expected at least 4 fields, got {}: {:?}",
                parts.len(),
                line
            )));
        }

        let core: u32 = parts[0]
            .parse()
            .map_err(|_| PluginError::Handshake(format!("invalid core version {:?}", parts[0])))?;
        if core != CORE_PROTOCOL_VERSION {
            return Err(PluginError::ProtocolMismatch {
                expected: format!("core version {}", CORE_PROTOCOL_VERSION),
                got: format!("core version {}", core),
            });
        }

        let app: u32 = parts[1].parse().map_err(|_| {
            PluginError::Handshake(format!("invalid protocol version {:?}", parts[1]))
        })?;
        if app != protocol_version {
            return Err(PluginError::ProtocolMismatch {
                expected: format!("protocol version {}", protocol_version),
                got: format!("protocol version {}", app),
            });
        }

        let address = match parts[2] {
            "unix" => PluginAddress::Unix(PathBuf::from(parts[3])),
            "tcp" => PluginAddress::Tcp(parts[3].to_string()),
            other => return Err(PluginError::UnsupportedTransport(format!("network {:?}", other))),
        };

        // go-plugin omits the protocol field for net/rpc plugins
        let protocol = parts.get(4).copied().unwrap_or("netrpc");
        if protocol != "grpc" {
            return Err(PluginError::UnsupportedTransport(format!(
                "protocol {:?}",
                protocol
            )));
        }

        let server_cert = parts
            .get(5)
            .filter(|cert| !cert.is_empty())
            .map(|cert| cert.to_string());

        Ok(Self {
            protocol_version: app,
            address,
            server_cert,
        })
    }
}
