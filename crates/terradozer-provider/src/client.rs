//! Provider capability trait
//!
//! Request and response types mirror the plugin protocol calls terradozer
//! uses, with payloads already decoded into [`Value`].

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::schema::ProviderSchema;
use crate::value::Value;
use async_trait::async_trait;

/// A resource reconstructed by the provider from its type and ID
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResource {
    pub type_name: String,
    pub state: Value,
    /// Provider-private metadata, passed back unchanged
    pub private: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct GetSchemaResponse {
    pub schema: ProviderSchema,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ConfigureRequest {
    pub terraform_version: String,
    pub config: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigureResponse {
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ImportResourceStateRequest {
    pub type_name: String,
    pub id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportResourceStateResponse {
    pub imported_resources: Vec<ImportedResource>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ReadResourceRequest {
    pub type_name: String,
    pub current_state: Value,
    pub private: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadResourceResponse {
    /// `Value::Null` when the remote object no longer exists
    pub new_state: Value,
    pub private: Vec<u8>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct ApplyResourceChangeRequest {
    pub type_name: String,
    pub prior_state: Value,
    pub planned_state: Value,
    pub config: Value,
    pub planned_private: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyResourceChangeResponse {
    pub new_state: Value,
    pub private: Vec<u8>,
    pub diagnostics: Diagnostics,
}

/// The capability set of a provider plugin.
///
/// Calls take `&mut self`: a plugin connection serves one request at a time,
/// so sharing a client across tasks needs external synchronization.
/// `Err` is reserved for transport failures; provider-reported problems come
/// back as diagnostics inside the response.
#[async_trait]
pub trait ProviderClient: Send {
    async fn get_schema(&mut self) -> Result<GetSchemaResponse>;

    async fn configure(&mut self, request: ConfigureRequest) -> Result<ConfigureResponse>;

    async fn import_resource_state(
        &mut self,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse>;

    async fn read_resource(&mut self, request: ReadResourceRequest) -> Result<ReadResourceResponse>;

    async fn apply_resource_change(
        &mut self,
        request: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse>;

    /// Stop the plugin; later calls fail
    async fn shutdown(&mut self) -> Result<()>;
}
