//! gRPC-backed [`ProviderClient`]

use crate::error::{PluginError, Result};
use crate::grpc::ProviderRpcClient;
use crate::handshake::{DEFAULT_HANDSHAKE_TIMEOUT, PluginAddress};
use crate::msgpack;
use crate::process::{PluginProcess, PluginState, SHUTDOWN_GRACE_PERIOD};
use crate::proto::{
    self, apply_resource_change, attribute_path, configure, diagnostic, import_resource_state,
    read_resource,
};
use crate::tls::{self, PLUGIN_SERVER_NAME, PluginCertificate};
use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use terradozer_provider::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, AttributeType, ConfigureRequest,
    ConfigureResponse, Diagnostic, Diagnostics, GetSchemaResponse, ImportResourceStateRequest,
    ImportResourceStateResponse, ImportedResource, ProviderClient, ProviderError, ProviderSchema,
    ReadResourceRequest, ReadResourceResponse, SchemaBlock, Value,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Channel, Endpoint, Uri};

/// How to launch a provider plugin
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub name: String,
    pub path: PathBuf,
    pub protocol_version: u32,
    pub handshake_timeout: Duration,
}

impl PluginConfig {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            protocol_version: 5,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// A provider plugin process and the gRPC connection to it
pub struct PluginClient {
    process: PluginProcess,
    rpc: ProviderRpcClient,
}

impl PluginClient {
    /// Launch the plugin, complete the handshake and connect to it.
    ///
    /// The plugin is handed a fresh client certificate; if it answers with a
    /// server certificate the channel is mutually authenticated TLS pinned to
    /// that certificate.
    pub async fn launch(config: PluginConfig) -> Result<Self> {
        let certificate = PluginCertificate::generate()?;
        let mut process = PluginProcess::launch(
            &config.name,
            &config.path,
            config.protocol_version,
            Some(certificate.pem()),
            config.handshake_timeout,
        )
        .await?;

        let channel = match open_channel(&process, &certificate).await {
            Ok(channel) => channel,
            Err(err) => {
                let _ = process.terminate(Duration::ZERO).await;
                return Err(err);
            }
        };

        Ok(Self {
            process,
            rpc: ProviderRpcClient::new(channel),
        })
    }

    pub fn state(&self) -> PluginState {
        self.process.state()
    }

    fn ready(&self) -> Result<()> {
        if self.process.is_ready() {
            Ok(())
        } else {
            Err(PluginError::Terminated)
        }
    }
}

async fn open_channel(
    process: &PluginProcess,
    certificate: &PluginCertificate,
) -> Result<Channel> {
    let Some(handshake) = process.handshake() else {
        return Err(PluginError::Handshake("no handshake recorded".to_string()));
    };

    let tls = match &handshake.server_cert {
        Some(server_cert) => {
            let config = tls::client_config(certificate, tls::decode_server_cert(server_cert)?)?;
            Some(TlsConnector::from(Arc::new(config)))
        }
        None => {
            tracing::warn!(
                "plugin {} did not offer a TLS certificate, connecting without TLS",
                process.name()
            );
            None
        }
    };
    let secured = tls.is_some();

    let channel = connect(&handshake.address, tls).await?;
    tracing::debug!(
        "connected to plugin {} at {} (tls={})",
        process.name(),
        handshake.address,
        secured
    );
    Ok(channel)
}

/// Byte stream to the plugin, plain or wrapped in TLS
trait PluginIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PluginIo for T {}

async fn connect(address: &PluginAddress, tls: Option<TlsConnector>) -> Result<Channel> {
    let address = address.clone();
    // the URI is ignored by the connector
    let channel = Endpoint::from_static("http://localhost")
        .connect_with_connector(tower::service_fn(move |_: Uri| {
            let address = address.clone();
            let tls = tls.clone();
            async move {
                let stream = dial(&address).await?;
                let stream: Box<dyn PluginIo> = match tls {
                    Some(tls) => {
                        let name = ServerName::try_from(PLUGIN_SERVER_NAME)
                            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                        Box::new(tls.connect(name, stream).await?)
                    }
                    None => stream,
                };
                Ok::<_, io::Error>(TokioIo::new(stream))
            }
        }))
        .await?;
    Ok(channel)
}

async fn dial(address: &PluginAddress) -> io::Result<Box<dyn PluginIo>> {
    match address {
        #[cfg(unix)]
        PluginAddress::Unix(path) => Ok(Box::new(tokio::net::UnixStream::connect(path).await?)),
        #[cfg(not(unix))]
        PluginAddress::Unix(path) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unix socket {}", path.display()),
        )),
        PluginAddress::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
    }
}

#[async_trait]
impl ProviderClient for PluginClient {
    async fn get_schema(&mut self) -> terradozer_provider::Result<GetSchemaResponse> {
        self.ready()?;
        let response = self.rpc.get_schema().await.map_err(PluginError::from)?;

        let provider = response
            .provider
            .and_then(|schema| schema.block)
            .map(|block| schema_block(&block))
            .unwrap_or_default();
        let resources = response
            .resource_schemas
            .into_iter()
            .map(|(name, schema)| {
                let block = schema.block.map(|b| schema_block(&b)).unwrap_or_default();
                (name, block)
            })
            .collect();

        Ok(GetSchemaResponse {
            schema: ProviderSchema { provider, resources },
            diagnostics: diagnostics(response.diagnostics),
        })
    }

    async fn configure(
        &mut self,
        request: ConfigureRequest,
    ) -> terradozer_provider::Result<ConfigureResponse> {
        self.ready()?;
        let response = self
            .rpc
            .configure(configure::Request {
                terraform_version: request.terraform_version,
                config: Some(dynamic_value(&request.config)?),
            })
            .await
            .map_err(PluginError::from)?;

        Ok(ConfigureResponse {
            diagnostics: diagnostics(response.diagnostics),
        })
    }

    async fn import_resource_state(
        &mut self,
        request: ImportResourceStateRequest,
    ) -> terradozer_provider::Result<ImportResourceStateResponse> {
        self.ready()?;
        let response = self
            .rpc
            .import_resource_state(import_resource_state::Request {
                type_name: request.type_name,
                id: request.id,
            })
            .await
            .map_err(PluginError::from)?;

        let imported_resources = response
            .imported_resources
            .into_iter()
            .map(|resource| {
                Ok(ImportedResource {
                    type_name: resource.type_name,
                    state: from_dynamic_value(resource.state.as_ref())?,
                    private: resource.private,
                })
            })
            .collect::<terradozer_provider::Result<Vec<_>>>()?;

        Ok(ImportResourceStateResponse {
            imported_resources,
            diagnostics: diagnostics(response.diagnostics),
        })
    }

    async fn read_resource(
        &mut self,
        request: ReadResourceRequest,
    ) -> terradozer_provider::Result<ReadResourceResponse> {
        self.ready()?;
        let response = self
            .rpc
            .read_resource(read_resource::Request {
                type_name: request.type_name,
                current_state: Some(dynamic_value(&request.current_state)?),
                private: request.private,
                provider_meta: None,
            })
            .await
            .map_err(PluginError::from)?;

        Ok(ReadResourceResponse {
            new_state: from_dynamic_value(response.new_state.as_ref())?,
            private: response.private,
            diagnostics: diagnostics(response.diagnostics),
        })
    }

    async fn apply_resource_change(
        &mut self,
        request: ApplyResourceChangeRequest,
    ) -> terradozer_provider::Result<ApplyResourceChangeResponse> {
        self.ready()?;
        let response = self
            .rpc
            .apply_resource_change(apply_resource_change::Request {
                type_name: request.type_name,
                prior_state: Some(dynamic_value(&request.prior_state)?),
                planned_state: Some(dynamic_value(&request.planned_state)?),
                config: Some(dynamic_value(&request.config)?),
                planned_private: request.planned_private,
                provider_meta: None,
            })
            .await
            .map_err(PluginError::from)?;

        Ok(ApplyResourceChangeResponse {
            new_state: from_dynamic_value(response.new_state.as_ref())?,
            private: response.private,
            diagnostics: diagnostics(response.diagnostics),
        })
    }

    async fn shutdown(&mut self) -> terradozer_provider::Result<()> {
        if self.process.state() == PluginState::Terminated {
            return Ok(());
        }

        match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, self.rpc.controller_shutdown()).await {
            Ok(Ok(())) => {}
            // the plugin may close the connection before answering
            Ok(Err(status)) => tracing::debug!(
                "plugin {} shutdown request failed: {}",
                self.process.name(),
                status.message()
            ),
            Err(_) => tracing::debug!("plugin {} shutdown request timed out", self.process.name()),
        }

        self.process
            .terminate(SHUTDOWN_GRACE_PERIOD)
            .await
            .map_err(ProviderError::from)
    }
}

fn dynamic_value(value: &Value) -> terradozer_provider::Result<proto::DynamicValue> {
    Ok(proto::DynamicValue {
        msgpack: msgpack::encode(value)?,
        json: Vec::new(),
    })
}

fn from_dynamic_value(value: Option<&proto::DynamicValue>) -> terradozer_provider::Result<Value> {
    let Some(value) = value else {
        return Ok(Value::Null);
    };
    if !value.msgpack.is_empty() {
        return Ok(msgpack::decode(&value.msgpack)?);
    }
    if !value.json.is_empty() {
        let json: serde_json::Value = serde_json::from_slice(&value.json)
            .map_err(|e| PluginError::Codec(e.to_string()))?;
        return Ok(Value::from(json));
    }
    Ok(Value::Null)
}

fn schema_block(block: &proto::schema::Block) -> SchemaBlock {
    let mut result = SchemaBlock::new();
    for attribute in &block.attributes {
        result = result.with_attribute(&attribute.name, AttributeType::from_json(&attribute.r#type));
    }
    for nested in &block.block_types {
        let inner = nested.block.as_ref().map(schema_block).unwrap_or_default();
        result = result.with_block(&nested.type_name, inner);
    }
    result
}

fn diagnostics(raw: Vec<proto::Diagnostic>) -> Diagnostics {
    raw.into_iter().map(diagnostic).collect()
}

fn diagnostic(raw: proto::Diagnostic) -> Diagnostic {
    let mut result = match raw.severity() {
        diagnostic::Severity::Warning => Diagnostic::warning(raw.summary, raw.detail),
        diagnostic::Severity::Error | diagnostic::Severity::Invalid => {
            Diagnostic::error(raw.summary, raw.detail)
        }
    };
    if let Some(path) = raw.attribute.as_ref().and_then(attribute_path_string) {
        result = result.with_attribute(path);
    }
    result
}

/// Render an attribute path as `block[0].name`
fn attribute_path_string(path: &proto::AttributePath) -> Option<String> {
    use attribute_path::step::Selector;

    let mut out = String::new();
    for step in &path.steps {
        match &step.selector {
            Some(Selector::AttributeName(name)) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            Some(Selector::ElementKeyString(key)) => out.push_str(&format!("[{:?}]", key)),
            Some(Selector::ElementKeyInt(index)) => out.push_str(&format!("[{}]", index)),
            None => {}
        }
    }
    (!out.is_empty()).then_some(out)
}
