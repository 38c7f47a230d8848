//! Plugin client error types

use crate::process::PluginState;
use std::path::PathBuf;
use std::time::Duration;
use terradozer_provider::ProviderError;
use thiserror::Error;

/// Plugin launch and transport errors
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("failed to start plugin {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("timeout after {0:?} waiting for plugin handshake")]
    HandshakeTimeout(Duration),

    #[error("plugin exited before completing the handshake ({status}){stderr}")]
    ExitedEarly { status: String, stderr: String },

    #[error("malformed plugin handshake: {0}")]
    Handshake(String),

    #[error("incompatible plugin protocol: expected {expected}, got {got}")]
    ProtocolMismatch { expected: String, got: String },

    #[error("unsupported plugin transport: {0}")]
    UnsupportedTransport(String),

    #[error("failed to connect to plugin: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("plugin RPC failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("plugin TLS setup failed: {0}")]
    Tls(String),

    #[error("failed to encode or decode value: {0}")]
    Codec(String),

    #[error("invalid plugin state transition from {from:?} to {to:?}")]
    InvalidTransition { from: PluginState, to: PluginState },

    #[error("plugin has been terminated")]
    Terminated,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PluginError>;

impl From<PluginError> for ProviderError {
    fn from(err: PluginError) -> Self {
        ProviderError::Transport(err.to_string())
    }
}
