//! Destruction orchestrator

use crate::error::{CoreError, Result};
use crate::factory::ProviderFactory;
use crate::outcome::{DestroyReport, DestructionOutcome, ResourceOutcome};
use std::collections::HashMap;
use terradozer_provider::{Provider, ProviderError, Value};
use terradozer_state::{ResourceId, ResourceInstanceAddress, StateSnapshot};

/// Deletes every managed resource recorded in a state snapshot.
///
/// Providers are created on first use through the factory and reused for
/// every later resource of the same provider. Calls are strictly sequential.
pub struct Destroyer<F> {
    factory: F,
    dry_run: bool,
    providers: HashMap<String, Option<Provider>>,
}

impl<F: ProviderFactory> Destroyer<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            dry_run: false,
            providers: HashMap::new(),
        }
    }

    /// Only report what would be deleted
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Process every resource instance of `state` in enumeration order.
    ///
    /// Per-resource failures are recorded in the report and never stop the
    /// run. Only an undecodable resource ID or a provider that cannot be set
    /// up returns an error.
    pub async fn run(&mut self, state: &StateSnapshot) -> Result<DestroyReport> {
        let mut report = DestroyReport::new();
        let dry_run = self.dry_run;

        for (address, instance) in state.addresses().with_instances() {
            for (key, _) in instance.deposed() {
                tracing::debug!("ignoring deposed object {} of {}", key, address);
            }
            let Some(current) = instance.current() else {
                tracing::debug!("{} has no current object", address);
                continue;
            };

            if !address.is_managed() {
                let id = current.resource_id().ok().map(|id| id.to_string());
                tracing::info!(
                    "can only delete managed resources, skipping data source (type={}, id={})",
                    address.resource_type(),
                    id.as_deref().unwrap_or("unknown")
                );
                report.record(ResourceOutcome {
                    address: address.to_string(),
                    resource_type: address.resource_type().to_string(),
                    id,
                    outcome: DestructionOutcome::SkippedUnsupportedMode,
                });
                continue;
            }
            report.attempted += 1;

            let id = current.resource_id().map_err(|source| CoreError::ResourceId {
                address: address.to_string(),
                source,
            })?;

            match self.provider(instance.provider()).await? {
                Some(provider) => {
                    destroy_instance(provider, address, &id, dry_run, &mut report).await;
                }
                None => {
                    tracing::info!(
                        "skipping resource of unsupported provider {} (type={}, id={})",
                        instance.provider(),
                        address.resource_type(),
                        id
                    );
                    report.record(outcome(address, id.as_str(), DestructionOutcome::SkippedUnsupportedProvider));
                }
            }
        }

        Ok(report)
    }

    async fn provider(&mut self, name: &str) -> Result<Option<&mut Provider>> {
        if !self.providers.contains_key(name) {
            tracing::debug!("setting up provider {}", name);
            let provider = self
                .factory
                .create(name)
                .await
                .map_err(|source| CoreError::ProviderSetup {
                    provider: name.to_string(),
                    source,
                })?;
            if provider.is_none() {
                tracing::warn!("provider {} is not supported, its resources are skipped", name);
            }
            self.providers.insert(name.to_string(), provider);
        }
        Ok(self.providers.get_mut(name).and_then(Option::as_mut))
    }

    /// Terminate every provider launched during the run.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn shutdown(&mut self) {
        for (name, provider) in self.providers.drain() {
            let Some(mut provider) = provider else {
                continue;
            };
            tracing::debug!("shutting down provider {}", name);
            if let Err(e) = provider.shutdown().await {
                tracing::warn!("failed to shut down provider {}: {}", name, e);
            }
        }
    }
}

async fn destroy_instance(
    provider: &mut Provider,
    address: &ResourceInstanceAddress,
    id: &ResourceId,
    dry_run: bool,
    report: &mut DestroyReport,
) {
    let resource_type = address.resource_type();

    let imported = match provider.import(resource_type, id.as_str()).await {
        Ok(imported) => imported,
        Err(err) => {
            log_skip(resource_type, id.as_str(), &err);
            report.record(outcome(address, id.as_str(), DestructionOutcome::SkippedImportFailed));
            return;
        }
    };
    if imported.is_empty() {
        tracing::warn!(
            "provider returned nothing to import (type={}, id={})",
            resource_type,
            id
        );
    }

    for resource in &imported {
        let refreshed = match provider.read(resource).await {
            Ok(response) => response.new_state,
            Err(err) => {
                log_skip(&resource.type_name, id.as_str(), &err);
                report.record(outcome(address, id.as_str(), DestructionOutcome::SkippedReadFailed));
                continue;
            }
        };

        // a composite import yields resources with IDs of their own
        let resource_id = refreshed
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(id.as_str())
            .to_string();

        if refreshed.is_null() {
            tracing::info!(
                "resource found in state does not exist anymore (type={}, id={})",
                resource.type_name,
                resource_id
            );
            report.record(outcome(address, &resource_id, DestructionOutcome::SkippedAlreadyGone));
            continue;
        }

        match provider.destroy(&resource.type_name, &refreshed, dry_run).await {
            Ok(()) if dry_run => {
                tracing::info!(
                    "would try to delete resource (type={}, id={})",
                    resource.type_name,
                    resource_id
                );
                report.record(outcome(address, &resource_id, DestructionOutcome::SkippedDryRun));
            }
            Ok(()) => {
                tracing::info!(
                    "finished deleting resource (type={}, id={})",
                    resource.type_name,
                    resource_id
                );
                report.record(outcome(address, &resource_id, DestructionOutcome::Deleted));
            }
            Err(err) => {
                log_skip(&resource.type_name, &resource_id, &err);
                report.record(outcome(address, &resource_id, DestructionOutcome::SkippedApplyFailed));
            }
        }
    }
}

fn outcome(
    address: &ResourceInstanceAddress,
    id: &str,
    outcome: DestructionOutcome,
) -> ResourceOutcome {
    ResourceOutcome {
        address: address.to_string(),
        resource_type: address.resource_type().to_string(),
        id: Some(id.to_string()),
        outcome,
    }
}

fn log_skip(resource_type: &str, id: &str, err: &ProviderError) {
    match err {
        // already names type and id
        ProviderError::Import { .. } => tracing::warn!("{}", err),
        _ => tracing::warn!("skipping resource (type={}, id={}): {}", resource_type, id, err),
    }
}
