//! In-memory provider for tests
//!
//! `MockProviderClient` implements [`ProviderClient`] without a plugin
//! process. Behaviour is scripted per resource ID and every call is recorded,
//! so tests can assert on exactly which requests reached the "provider".
//!
//! Clones share the same script and call log, which lets a test keep a handle
//! after moving the client into a [`Provider`](crate::Provider).
//!
//! ```
//! use terradozer_provider::mock::MockProviderClient;
//! use terradozer_provider::Provider;
//!
//! let mock = MockProviderClient::new().gone("i-456");
//! let _provider = Provider::new("aws", mock.clone());
//! // ... drive `provider` ...
//! assert!(mock.apply_calls().is_empty());
//! ```

use crate::client::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ConfigureRequest, ConfigureResponse,
    GetSchemaResponse, ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ProviderClient, ReadResourceRequest, ReadResourceResponse,
};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ProviderError, Result};
use crate::schema::ProviderSchema;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// A request observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    GetSchema,
    Configure(Value),
    Import {
        type_name: String,
        id: String,
    },
    Read {
        type_name: String,
        current_state: Value,
    },
    Apply {
        type_name: String,
        prior_state: Value,
        planned_state: Value,
        config: Value,
    },
    Shutdown,
}

#[derive(Default)]
struct MockState {
    schema: ProviderSchema,
    configure_diagnostics: Diagnostics,
    import_failures: HashMap<String, String>,
    import_results: HashMap<String, Vec<ImportedResource>>,
    read_failures: HashMap<String, String>,
    gone: HashSet<String>,
    apply_failures: HashMap<String, String>,
    terminated: bool,
    calls: Vec<MockCall>,
}

/// Scriptable in-memory [`ProviderClient`]
#[derive(Clone, Default)]
pub struct MockProviderClient {
    state: Arc<Mutex<MockState>>,
}

impl MockProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_schema(self, schema: ProviderSchema) -> Self {
        self.lock().schema = schema;
        self
    }

    /// Return `diagnostic` from Configure
    pub fn fail_configure(self, diagnostic: Diagnostic) -> Self {
        self.lock().configure_diagnostics.push(diagnostic);
        self
    }

    /// Return an error diagnostic when importing `id`
    pub fn fail_import(self, id: &str, message: &str) -> Self {
        self.lock()
            .import_failures
            .insert(id.to_string(), message.to_string());
        self
    }

    /// Return `resources` when importing `id` instead of a single resource
    pub fn import_returns(self, id: &str, resources: Vec<ImportedResource>) -> Self {
        self.lock().import_results.insert(id.to_string(), resources);
        self
    }

    /// Return an error diagnostic when reading the resource with this `id`
    pub fn fail_read(self, id: &str, message: &str) -> Self {
        self.lock()
            .read_failures
            .insert(id.to_string(), message.to_string());
        self
    }

    /// Report the resource with this `id` as no longer existing
    pub fn gone(self, id: &str) -> Self {
        self.lock().gone.insert(id.to_string());
        self
    }

    /// Return an error diagnostic when deleting the resource with this `id`
    pub fn fail_apply(self, id: &str, message: &str) -> Self {
        self.lock()
            .apply_failures
            .insert(id.to_string(), message.to_string());
        self
    }

    /// Every request received so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn apply_calls(&self) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::Apply { .. }))
            .collect()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    fn record(&self, call: MockCall) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.lock();
        if state.terminated {
            return Err(ProviderError::Transport("plugin has been terminated".to_string()));
        }
        state.calls.push(call);
        Ok(state)
    }
}

fn id_of(state: &Value) -> String {
    state
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn error(message: &str) -> Diagnostics {
    Diagnostics::from_iter([Diagnostic::error(message, "")])
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn get_schema(&mut self) -> Result<GetSchemaResponse> {
        let state = self.record(MockCall::GetSchema)?;
        Ok(GetSchemaResponse {
            schema: state.schema.clone(),
            diagnostics: Diagnostics::new(),
        })
    }

    async fn configure(&mut self, request: ConfigureRequest) -> Result<ConfigureResponse> {
        let state = self.record(MockCall::Configure(request.config))?;
        Ok(ConfigureResponse {
            diagnostics: state.configure_diagnostics.clone(),
        })
    }

    async fn import_resource_state(
        &mut self,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse> {
        let state = self.record(MockCall::Import {
            type_name: request.type_name.clone(),
            id: request.id.clone(),
        })?;

        if let Some(message) = state.import_failures.get(&request.id) {
            return Ok(ImportResourceStateResponse {
                imported_resources: Vec::new(),
                diagnostics: error(message),
            });
        }

        let imported_resources = match state.import_results.get(&request.id) {
            Some(resources) => resources.clone(),
            None => vec![ImportedResource {
                type_name: request.type_name,
                state: Value::object([("id", request.id)]),
                private: Vec::new(),
            }],
        };
        Ok(ImportResourceStateResponse {
            imported_resources,
            diagnostics: Diagnostics::new(),
        })
    }

    async fn read_resource(&mut self, request: ReadResourceRequest) -> Result<ReadResourceResponse> {
        let id = id_of(&request.current_state);
        let state = self.record(MockCall::Read {
            type_name: request.type_name,
            current_state: request.current_state.clone(),
        })?;

        if let Some(message) = state.read_failures.get(&id) {
            return Ok(ReadResourceResponse {
                diagnostics: error(message),
                ..Default::default()
            });
        }

        let new_state = if state.gone.contains(&id) {
            Value::Null
        } else {
            request.current_state
        };
        Ok(ReadResourceResponse {
            new_state,
            private: request.private,
            diagnostics: Diagnostics::new(),
        })
    }

    async fn apply_resource_change(
        &mut self,
        request: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse> {
        let id = id_of(&request.prior_state);
        let state = self.record(MockCall::Apply {
            type_name: request.type_name,
            prior_state: request.prior_state,
            planned_state: request.planned_state,
            config: request.config,
        })?;

        let diagnostics = match state.apply_failures.get(&id) {
            Some(message) => error(message),
            None => Diagnostics::new(),
        };
        Ok(ApplyResourceChangeResponse {
            new_state: Value::Null,
            private: Vec::new(),
            diagnostics,
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        let mut state = self.record(MockCall::Shutdown)?;
        state.terminated = true;
        Ok(())
    }
}
