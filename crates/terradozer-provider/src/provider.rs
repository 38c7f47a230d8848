//! Provider facade
//!
//! Wraps a [`ProviderClient`] with the four operations the destroy run needs
//! and owns request construction for each of them.

use crate::client::{
    ApplyResourceChangeRequest, ConfigureRequest, ImportResourceStateRequest, ImportedResource,
    ProviderClient, ReadResourceRequest, ReadResourceResponse,
};
use crate::diagnostics::Diagnostics;
use crate::error::{ProviderError, Result};
use crate::force_destroy::enable_force_destroy_attributes;
use crate::schema::{ProviderSchema, SchemaBlock};
use crate::value::Value;
use std::collections::BTreeMap;

/// Terraform core version announced to providers on configure
pub const TERRAFORM_VERSION: &str = "0.12.18";

/// A launched provider plugin ready to serve requests
pub struct Provider {
    name: String,
    client: Box<dyn ProviderClient>,
    schema: Option<ProviderSchema>,
}

impl Provider {
    pub fn new(name: impl Into<String>, client: impl ProviderClient + 'static) -> Self {
        Self {
            name: name.into(),
            client: Box::new(client),
            schema: None,
        }
    }

    /// Provider type name, e.g. "aws"
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema fetched during [`configure`](Self::configure)
    pub fn schema(&self) -> Option<&ProviderSchema> {
        self.schema.as_ref()
    }

    /// Configure the provider.
    ///
    /// Every option the provider's configuration schema declares is sent;
    /// options not present in `options` are sent as unknown values. Any error
    /// diagnostic means the provider cannot be used at all.
    pub async fn configure(&mut self, options: &BTreeMap<String, Value>) -> Result<Diagnostics> {
        let response = self.client.get_schema().await?;
        if response.diagnostics.has_errors() {
            return Err(ProviderError::Configure {
                provider: self.name.clone(),
                diagnostics: response.diagnostics,
            });
        }
        let mut diagnostics = response.diagnostics;

        let config = build_config(&self.name, &response.schema.provider, options)?;
        tracing::debug!("configuring provider {}: {}", self.name, config);
        self.schema = Some(response.schema);

        let response = self
            .client
            .configure(ConfigureRequest {
                terraform_version: TERRAFORM_VERSION.to_string(),
                config,
            })
            .await?;
        diagnostics.extend(response.diagnostics);

        if diagnostics.has_errors() {
            return Err(ProviderError::Configure {
                provider: self.name.clone(),
                diagnostics,
            });
        }
        log_warnings(&diagnostics);

        Ok(diagnostics)
    }

    /// Ask the provider to reconstruct resources from a type name and ID
    pub async fn import(&mut self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>> {
        let response = self
            .client
            .import_resource_state(ImportResourceStateRequest {
                type_name: resource_type.to_string(),
                id: id.to_string(),
            })
            .await?;

        if response.diagnostics.has_errors() {
            return Err(ProviderError::Import {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                diagnostics: response.diagnostics,
            });
        }
        log_warnings(&response.diagnostics);

        Ok(response.imported_resources)
    }

    /// Refresh an imported resource against the live infrastructure.
    ///
    /// A `Value::Null` new state means the remote object is already gone.
    pub async fn read(&mut self, imported: &ImportedResource) -> Result<ReadResourceResponse> {
        let response = self
            .client
            .read_resource(ReadResourceRequest {
                type_name: imported.type_name.clone(),
                current_state: imported.state.clone(),
                private: imported.private.clone(),
            })
            .await?;

        if response.diagnostics.has_errors() {
            return Err(ProviderError::Read {
                resource_type: imported.type_name.clone(),
                diagnostics: response.diagnostics,
            });
        }
        log_warnings(&response.diagnostics);

        Ok(response)
    }

    /// Delete a resource given its current state.
    ///
    /// With `dry_run` no request is sent and the call always succeeds.
    /// Otherwise the force-destroy attributes are switched on and an apply is
    /// requested whose planned state and config are both null.
    pub async fn destroy(
        &mut self,
        resource_type: &str,
        current_state: &Value,
        dry_run: bool,
    ) -> Result<()> {
        if dry_run {
            return Ok(());
        }

        let resource_schema = self
            .schema
            .as_ref()
            .and_then(|schema| schema.resource(resource_type));
        let prior_state = enable_force_destroy_attributes(current_state.clone(), resource_schema);

        let response = self
            .client
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: resource_type.to_string(),
                prior_state,
                planned_state: Value::Null,
                config: Value::Null,
                planned_private: Vec::new(),
            })
            .await?;

        if response.diagnostics.has_errors() {
            return Err(ProviderError::Apply {
                resource_type: resource_type.to_string(),
                diagnostics: response.diagnostics,
            });
        }
        log_warnings(&response.diagnostics);

        Ok(())
    }

    /// Terminate the plugin behind this provider
    pub async fn shutdown(&mut self) -> Result<()> {
        self.client.shutdown().await
    }
}

/// Build a provider configuration object from caller-supplied options.
///
/// The recognized option names are the top-level names of the provider's
/// configuration schema. Unsupplied names become [`Value::Unknown`] because
/// the provider expects every declared attribute to be present.
pub fn build_config(
    provider: &str,
    schema: &SchemaBlock,
    options: &BTreeMap<String, Value>,
) -> Result<Value> {
    if let Some(option) = options.keys().find(|name| !schema.declares(name)) {
        return Err(ProviderError::UnknownOption {
            provider: provider.to_string(),
            option: option.clone(),
        });
    }

    Ok(Value::Map(
        schema
            .names()
            .map(|name| {
                let value = options.get(name).cloned().unwrap_or(Value::Unknown);
                (name.to_string(), value)
            })
            .collect(),
    ))
}

fn log_warnings(diagnostics: &Diagnostics) {
    for warning in diagnostics.warnings() {
        tracing::warn!("{}", warning);
    }
}
