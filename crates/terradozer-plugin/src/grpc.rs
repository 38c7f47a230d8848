//! Hand-written tonic client for the tfplugin5 provider service

use crate::proto::{
    self, apply_resource_change, configure, get_provider_schema, import_resource_state, method,
    read_resource,
};
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

/// Providers ship schemas of several megabytes
pub const MAX_MESSAGE_SIZE: usize = 256 << 20;

#[derive(Debug, Clone)]
pub struct ProviderRpcClient {
    inner: tonic::client::Grpc<Channel>,
}

impl ProviderRpcClient {
    pub fn new(channel: Channel) -> Self {
        let inner = tonic::client::Grpc::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE);
        Self { inner }
    }

    async fn unary<Req, Resp>(&mut self, path: &'static str, request: Req) -> Result<Resp, tonic::Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("service was not ready: {}", e)))?;

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = self
            .inner
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }

    pub async fn get_schema(&mut self) -> Result<get_provider_schema::Response, tonic::Status> {
        self.unary(method::GET_SCHEMA, get_provider_schema::Request {})
            .await
    }

    pub async fn configure(
        &mut self,
        request: configure::Request,
    ) -> Result<configure::Response, tonic::Status> {
        self.unary(method::CONFIGURE, request).await
    }

    pub async fn import_resource_state(
        &mut self,
        request: import_resource_state::Request,
    ) -> Result<import_resource_state::Response, tonic::Status> {
        self.unary(method::IMPORT_RESOURCE_STATE, request).await
    }

    pub async fn read_resource(
        &mut self,
        request: read_resource::Request,
    ) -> Result<read_resource::Response, tonic::Status> {
        self.unary(method::READ_RESOURCE, request).await
    }

    pub async fn apply_resource_change(
        &mut self,
        request: apply_resource_change::Request,
    ) -> Result<apply_resource_change::Response, tonic::Status> {
        self.unary(method::APPLY_RESOURCE_CHANGE, request).await
    }

    /// Ask the go-plugin server to exit gracefully
    pub async fn controller_shutdown(&mut self) -> Result<(), tonic::Status> {
        let _: proto::Empty = self
            .unary(method::CONTROLLER_SHUTDOWN, proto::Empty {})
            .await?;
        Ok(())
    }
}
