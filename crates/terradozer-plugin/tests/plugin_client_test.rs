//! End-to-end tests of `PluginClient` against an in-process tfplugin5 server
//!
//! A shell script stands in for the provider binary: it prints a handshake
//! pointing at a socket served by the test and records the environment it
//! was started with.

#![cfg(unix)]

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, ServerConfig, SignatureScheme};
use serial_test::serial;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tempfile::TempDir;
use terradozer_plugin::proto::{
    self, apply_resource_change, configure, get_provider_schema, import_resource_state, method,
    read_resource,
};
use terradozer_plugin::{PluginCertificate, PluginClient, PluginConfig, PluginError, msgpack};
use terradozer_provider::{Provider, Value};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio_rustls::TlsAcceptor;
use tonic::body::BoxBody;
use tonic::codec::ProstCodec;
use tonic::codegen::{Body, BoxFuture, Service, StdError, empty_body, http};
use tonic::server::{NamedService, UnaryService};
use tonic::transport::Server;
use tonic::transport::server::Connected;

/// Requests the fake provider received
#[derive(Default)]
struct Received {
    configure: Option<configure::Request>,
    import: Option<import_resource_state::Request>,
    read: Option<read_resource::Request>,
    apply: Option<apply_resource_change::Request>,
    shutdown: bool,
}

type Log = Arc<Mutex<Received>>;

/// Answers a unary call with the result of a closure
struct Unary<F>(F);

impl<Req, Resp, F> UnaryService<Req> for Unary<F>
where
    F: FnMut(Req) -> Resp,
{
    type Response = Resp;
    type Future = std::future::Ready<Result<tonic::Response<Resp>, tonic::Status>>;

    fn call(&mut self, request: tonic::Request<Req>) -> Self::Future {
        std::future::ready(Ok(tonic::Response::new((self.0)(request.into_inner()))))
    }
}

async fn unary<Req, Resp, B>(
    request: http::Request<B>,
    handler: impl FnMut(Req) -> Resp + Send + 'static,
) -> http::Response<BoxBody>
where
    Req: prost::Message + Default + Send + 'static,
    Resp: prost::Message + Send + 'static,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    let mut grpc = tonic::server::Grpc::new(ProstCodec::<Resp, Req>::default());
    grpc.unary(Unary(handler), request).await
}

fn unimplemented() -> http::Response<BoxBody> {
    http::Response::builder()
        .status(200)
        .header("grpc-status", tonic::Code::Unimplemented as i32)
        .header(http::header::CONTENT_TYPE, tonic::metadata::GRPC_CONTENT_TYPE)
        .body(empty_body())
        .unwrap()
}

fn dynamic(value: &Value) -> proto::DynamicValue {
    proto::DynamicValue {
        msgpack: msgpack::encode(value).unwrap(),
        json: Vec::new(),
    }
}

fn decode(value: &Option<proto::DynamicValue>) -> Value {
    msgpack::decode(&value.as_ref().unwrap().msgpack).unwrap()
}

fn attribute(name: &str, ty: &str) -> proto::schema::Attribute {
    proto::schema::Attribute {
        name: name.to_string(),
        r#type: format!("{:?}", ty).into_bytes(),
        ..Default::default()
    }
}

fn schema_response() -> get_provider_schema::Response {
    let provider = proto::Schema {
        block: Some(proto::schema::Block {
            attributes: vec![attribute("region", "string")],
            ..Default::default()
        }),
        ..Default::default()
    };
    let bucket = proto::Schema {
        block: Some(proto::schema::Block {
            attributes: vec![
                attribute("id", "string"),
                attribute("force_destroy", "bool"),
            ],
            ..Default::default()
        }),
        ..Default::default()
    };
    get_provider_schema::Response {
        provider: Some(provider),
        resource_schemas: [("aws_s3_bucket".to_string(), bucket)].into(),
        ..Default::default()
    }
}

/// tfplugin5.Provider, recording every request
#[derive(Clone)]
struct FakeProvider(Log);

impl NamedService for FakeProvider {
    const NAME: &'static str = "tfplugin5.Provider";
}

impl<B> Service<http::Request<B>> for FakeProvider
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let log = self.0.clone();
        let path = request.uri().path().to_string();
        Box::pin(async move {
            let response = match path.as_str() {
                method::GET_SCHEMA => {
                    unary(request, |_: get_provider_schema::Request| schema_response()).await
                }
                method::CONFIGURE => {
                    unary(request, move |req: configure::Request| {
                        log.lock().unwrap().configure = Some(req);
                        configure::Response::default()
                    })
                    .await
                }
                method::IMPORT_RESOURCE_STATE => {
                    unary(request, move |req: import_resource_state::Request| {
                        let state = Value::object([
                            ("id", Value::from(req.id.as_str())),
                            ("force_destroy", Value::Bool(false)),
                        ]);
                        let response = import_resource_state::Response {
                            imported_resources: vec![import_resource_state::ImportedResource {
                                type_name: req.type_name.clone(),
                                state: Some(dynamic(&state)),
                                private: b"import-private".to_vec(),
                            }],
                            ..Default::default()
                        };
                        log.lock().unwrap().import = Some(req);
                        response
                    })
                    .await
                }
                method::READ_RESOURCE => {
                    unary(request, move |req: read_resource::Request| {
                        let response = read_resource::Response {
                            new_state: req.current_state.clone(),
                            private: req.private.clone(),
                            ..Default::default()
                        };
                        log.lock().unwrap().read = Some(req);
                        response
                    })
                    .await
                }
                method::APPLY_RESOURCE_CHANGE => {
                    unary(request, move |req: apply_resource_change::Request| {
                        log.lock().unwrap().apply = Some(req);
                        apply_resource_change::Response {
                            new_state: Some(dynamic(&Value::Null)),
                            ..Default::default()
                        }
                    })
                    .await
                }
                _ => unimplemented(),
            };
            Ok(response)
        })
    }
}

/// plugin.GRPCController
#[derive(Clone)]
struct FakeController(Log);

impl NamedService for FakeController {
    const NAME: &'static str = "plugin.GRPCController";
}

impl<B> Service<http::Request<B>> for FakeController
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        let log = self.0.clone();
        let path = request.uri().path().to_string();
        Box::pin(async move {
            let response = if path == method::CONTROLLER_SHUTDOWN {
                unary(request, move |_: proto::Empty| {
                    log.lock().unwrap().shutdown = true;
                    proto::Empty {}
                })
                .await
            } else {
                unimplemented()
            };
            Ok(response)
        })
    }
}

/// Server side of a TLS connection
struct TlsConn(tokio_rustls::server::TlsStream<UnixStream>);

impl Connected for TlsConn {
    type ConnectInfo = ();

    fn connect_info(&self) -> Self::ConnectInfo {}
}

impl AsyncRead for TlsConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

/// Accepts any client certificate and remembers the last one presented
#[derive(Debug)]
struct RecordingClientVerifier {
    presented: Arc<Mutex<Option<Vec<u8>>>>,
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl ClientCertVerifier for RecordingClientVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        *self.presented.lock().unwrap() = Some(end_entity.as_ref().to_vec());
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// A fake provider listening on a unix socket in its own temp dir
struct FakePlugin {
    dir: TempDir,
    socket: PathBuf,
    log: Log,
    client_cert: Arc<Mutex<Option<Vec<u8>>>>,
}

impl FakePlugin {
    fn start_plaintext() -> Self {
        let plugin = Self::new();
        let listener = UnixListener::bind(&plugin.socket).unwrap();
        let incoming = futures_util::stream::unfold(listener, |listener| async move {
            let conn = listener.accept().await.map(|(stream, _)| stream);
            Some((conn, listener))
        });
        plugin.serve(incoming);
        plugin
    }

    /// Serve TLS with `server_cert`, requiring a client certificate
    fn start_tls(server_cert: &PluginCertificate) -> Self {
        let plugin = Self::new();
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let verifier = RecordingClientVerifier {
            presented: plugin.client_cert.clone(),
            provider: provider.clone(),
        };
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_client_cert_verifier(Arc::new(verifier))
            .with_single_cert(vec![server_cert.der().clone()], server_cert.private_key())
            .unwrap();
        config.alpn_protocols = vec![b"h2".to_vec()];
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = UnixListener::bind(&plugin.socket).unwrap();
        let incoming =
            futures_util::stream::unfold((listener, acceptor), |(listener, acceptor)| async move {
                loop {
                    let stream = match listener.accept().await {
                        Ok((stream, _)) => stream,
                        Err(e) => return Some((Err(e), (listener, acceptor))),
                    };
                    // a client that rejects the certificate just hangs up
                    if let Ok(tls) = acceptor.accept(stream).await {
                        return Some((Ok(TlsConn(tls)), (listener, acceptor)));
                    }
                }
            });
        plugin.serve(incoming);
        plugin
    }

    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("provider.sock");
        Self {
            dir,
            socket,
            log: Log::default(),
            client_cert: Arc::default(),
        }
    }

    fn serve<S, IO>(&self, incoming: S)
    where
        S: futures_util::Stream<Item = std::io::Result<IO>> + Send + 'static,
        IO: Connected + AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server = Server::builder()
            .add_service(FakeProvider(self.log.clone()))
            .add_service(FakeController(self.log.clone()))
            .serve_with_incoming(incoming);
        tokio::spawn(server);
    }

    /// Script that announces this socket and records its environment
    fn script(&self, cert_field: Option<String>) -> PathBuf {
        let handshake = match cert_field {
            Some(cert) => format!("1|5|unix|{}|grpc|{}", self.socket.display(), cert),
            None => format!("1|5|unix|{}|grpc", self.socket.display()),
        };
        let path = self.dir.path().join("terraform-provider-aws");
        let body = format!(
            r#"#!/bin/sh
printf '%s' "$PLUGIN_CLIENT_CERT" > {dir}/client-cert.pem
printf '%s' "$PLUGIN_UNIX_SOCKET_DIR" > {dir}/socket-dir
echo "{handshake}"
exec sleep 30
"#,
            dir = self.dir.path().display(),
        );
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn recorded(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).unwrap()
    }
}

fn pem_to_der(pem: &str) -> Vec<u8> {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    STANDARD.decode(body).unwrap()
}

fn region(name: &str) -> BTreeMap<String, Value> {
    BTreeMap::from([("region".to_string(), Value::from(name))])
}

/// A full destroy over mutual TLS: configure, import, read and apply reach
/// the plugin, the delete is requested with null planned state and config,
/// and shutdown cleans up the socket dir
#[tokio::test]
#[serial]
async fn test_destroy_over_mutual_tls() {
    let server_cert = PluginCertificate::generate().unwrap();
    let plugin = FakePlugin::start_tls(&server_cert);
    let script = plugin.script(Some(STANDARD_NO_PAD.encode(server_cert.der())));

    let client = PluginClient::launch(PluginConfig::new("aws", script))
        .await
        .unwrap();

    let socket_dir = PathBuf::from(plugin.recorded("socket-dir"));
    let mode = std::fs::metadata(&socket_dir).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);

    let mut provider = Provider::new("aws", client);
    provider.configure(&region("eu-west-1")).await.unwrap();

    let imported = provider.import("aws_s3_bucket", "my-bucket").await.unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].private, b"import-private".to_vec());

    let read = provider.read(&imported[0]).await.unwrap();
    assert_eq!(read.new_state.get("id"), Some(&Value::from("my-bucket")));

    provider
        .destroy("aws_s3_bucket", &read.new_state, false)
        .await
        .unwrap();
    provider.shutdown().await.unwrap();

    // the plugin only accepted the certificate it was handed
    let presented = plugin.client_cert.lock().unwrap().clone().unwrap();
    assert_eq!(presented, pem_to_der(&plugin.recorded("client-cert.pem")));

    let log = plugin.log.lock().unwrap();
    let configure = log.configure.as_ref().unwrap();
    assert_eq!(configure.terraform_version, "0.12.18");
    assert_eq!(
        decode(&configure.config),
        Value::object([("region", "eu-west-1")])
    );

    let import = log.import.as_ref().unwrap();
    assert_eq!(import.type_name, "aws_s3_bucket");
    assert_eq!(import.id, "my-bucket");

    let read = log.read.as_ref().unwrap();
    assert_eq!(read.private, b"import-private".to_vec());

    let apply = log.apply.as_ref().unwrap();
    assert_eq!(apply.type_name, "aws_s3_bucket");
    assert_eq!(apply.planned_state.as_ref().unwrap().msgpack, vec![0xc0]);
    assert_eq!(apply.config.as_ref().unwrap().msgpack, vec![0xc0]);
    assert_eq!(
        decode(&apply.prior_state).get("force_destroy"),
        Some(&Value::Bool(true))
    );

    assert!(log.shutdown);
    assert!(!socket_dir.exists());
}

/// A plugin that offers no certificate is still usable over plaintext
#[tokio::test]
#[serial]
async fn test_destroy_without_tls() {
    let plugin = FakePlugin::start_plaintext();
    let script = plugin.script(None);

    let client = PluginClient::launch(PluginConfig::new("aws", script))
        .await
        .unwrap();
    let mut provider = Provider::new("aws", client);
    provider.configure(&region("us-east-1")).await.unwrap();
    provider
        .destroy(
            "aws_s3_bucket",
            &Value::object([("id", "b"), ("force_destroy", "false")]),
            false,
        )
        .await
        .unwrap();
    provider.shutdown().await.unwrap();

    assert!(plugin.recorded("client-cert.pem").starts_with("-----BEGIN CERTIFICATE-----"));

    let log = plugin.log.lock().unwrap();
    let apply = log.apply.as_ref().unwrap();
    assert_eq!(apply.planned_state.as_ref().unwrap().msgpack, vec![0xc0]);
    assert_eq!(apply.config.as_ref().unwrap().msgpack, vec![0xc0]);
    assert!(log.shutdown);
}

/// A server certificate other than the announced one fails the launch
#[tokio::test]
#[serial]
async fn test_unexpected_server_certificate_is_rejected() {
    let server_cert = PluginCertificate::generate().unwrap();
    let announced = PluginCertificate::generate().unwrap();
    let plugin = FakePlugin::start_tls(&server_cert);
    let script = plugin.script(Some(STANDARD_NO_PAD.encode(announced.der())));

    let result = PluginClient::launch(PluginConfig::new("aws", script)).await;
    assert!(matches!(result, Err(PluginError::Connect(_))));

    let socket_dir = plugin.recorded("socket-dir");
    assert!(!Path::new(&socket_dir).exists());
    assert!(plugin.log.lock().unwrap().configure.is_none());
}

/// A certificate field that is not base64 fails the launch
#[tokio::test]
#[serial]
async fn test_malformed_server_certificate() {
    let plugin = FakePlugin::start_plaintext();
    let script = plugin.script(Some("%%%".to_string()));

    let result = PluginClient::launch(PluginConfig::new("aws", script)).await;
    assert!(matches!(result, Err(PluginError::Tls(_))));
}
