//! State snapshot model and reader
//!
//! Reads Terraform state files in format version 4. The snapshot is loaded once
//! and never mutated afterwards; terradozer never writes state back.

use crate::address::{InstanceKey, ResourceInstanceAddress, ResourceMode, provider_type_name};
use crate::enumerator::ResourceEnumerator;
use crate::error::{Result, StateError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use tokio::fs;

const STATE_VERSION: u64 = 4;

/// Immutable, in-memory view of a state file
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    terraform_version: Option<String>,
    serial: u64,
    lineage: Option<String>,
    entries: Vec<(ResourceInstanceAddress, ResourceInstance)>,
    index: HashMap<ResourceInstanceAddress, usize>,
}

impl StateSnapshot {
    /// Read and parse the state file at `path`
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !fs::try_exists(path).await? {
            return Err(StateError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        let snapshot = Self::from_json(&content)?;

        tracing::debug!(
            "Loaded state {} with {} resource instances",
            path.display(),
            snapshot.len()
        );
        Ok(snapshot)
    }

    /// Parse a state document from its JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let header: VersionHeader = serde_json::from_str(content)?;
        if header.version != STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: header.version,
                supported: STATE_VERSION,
            });
        }

        let raw: RawState = serde_json::from_str(content)?;
        let mut snapshot = Self {
            terraform_version: raw.terraform_version,
            serial: raw.serial,
            lineage: raw.lineage,
            ..Self::default()
        };

        for resource in raw.resources {
            let provider = provider_type_name(&resource.provider)
                .or_else(|| implied_provider(&resource.resource_type))
                .ok_or_else(|| {
                    StateError::Invalid(format!(
                        "cannot determine provider of resource {}.{}",
                        resource.resource_type, resource.name
                    ))
                })?;

            // Objects sharing an index key (current + deposed) belong to one instance
            let mut grouped: Vec<(Option<InstanceKey>, ResourceInstance)> = Vec::new();
            for raw_instance in resource.instances {
                let key = raw_instance.index_key.clone().map(InstanceKey::from);
                let position = match grouped.iter().position(|(k, _)| *k == key) {
                    Some(position) => position,
                    None => {
                        grouped.push((key, ResourceInstance::new(provider.clone())));
                        grouped.len() - 1
                    }
                };
                let instance = &mut grouped[position].1;

                let deposed = raw_instance.deposed.clone();
                let object = ResourceObject::try_from(raw_instance)?;
                match deposed {
                    Some(deposed_key) => {
                        instance.deposed.insert(deposed_key, object);
                    }
                    None if instance.current.is_some() => {
                        return Err(StateError::Invalid(format!(
                            "resource {}.{} has more than one current object for the same key",
                            resource.resource_type, resource.name
                        )));
                    }
                    None => instance.current = Some(object),
                }
            }

            for (key, instance) in grouped {
                let mut addr = ResourceInstanceAddress::new(
                    resource.mode,
                    &resource.resource_type,
                    &resource.name,
                );
                if let Some(module) = &resource.module {
                    addr = addr.in_module(module);
                }
                if let Some(key) = key {
                    addr = addr.with_key(key);
                }
                snapshot.insert(addr, instance)?;
            }
        }

        Ok(snapshot)
    }

    fn insert(&mut self, addr: ResourceInstanceAddress, instance: ResourceInstance) -> Result<()> {
        if self.index.contains_key(&addr) {
            return Err(StateError::DuplicateAddress(addr.to_string()));
        }
        self.index.insert(addr.clone(), self.entries.len());
        self.entries.push((addr, instance));
        Ok(())
    }

    /// Enumerate every resource instance address in file order
    pub fn addresses(&self) -> ResourceEnumerator<'_> {
        ResourceEnumerator::new(&self.entries)
    }

    pub fn resource_instance(&self, addr: &ResourceInstanceAddress) -> Option<&ResourceInstance> {
        self.index.get(addr).map(|&i| &self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn terraform_version(&self) -> Option<&str> {
        self.terraform_version.as_deref()
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn lineage(&self) -> Option<&str> {
        self.lineage.as_deref()
    }
}

/// All objects recorded for one resource instance address
#[derive(Debug, Clone)]
pub struct ResourceInstance {
    provider: String,
    current: Option<ResourceObject>,
    deposed: BTreeMap<String, ResourceObject>,
}

impl ResourceInstance {
    fn new(provider: String) -> Self {
        Self {
            provider,
            current: None,
            deposed: BTreeMap::new(),
        }
    }

    /// Provider type name (e.g. "aws") responsible for this instance
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn current(&self) -> Option<&ResourceObject> {
        self.current.as_ref()
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    /// Objects replaced by create-before-destroy that were never cleaned up
    pub fn deposed(&self) -> impl Iterator<Item = (&String, &ResourceObject)> {
        self.deposed.iter()
    }
}

/// Schema-versioned attribute payload of a resource object
#[derive(Debug, Clone)]
pub struct ResourceObject {
    schema_version: u64,
    attributes: serde_json::Value,
    private: Vec<u8>,
}

impl ResourceObject {
    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    /// Attribute payload as a JSON object
    pub fn attributes(&self) -> &serde_json::Value {
        &self.attributes
    }

    /// Provider-private metadata, never interpreted
    pub fn private(&self) -> &[u8] {
        &self.private
    }

    /// Decode the `id` attribute
    pub fn resource_id(&self) -> Result<ResourceId> {
        let field: IdField = serde_json::from_value(self.attributes.clone())
            .map_err(|e| StateError::InvalidId(e.to_string()))?;

        match field.id {
            Some(id) if !id.is_empty() => Ok(ResourceId(id)),
            _ => Err(StateError::MissingId),
        }
    }
}

impl TryFrom<RawInstance> for ResourceObject {
    type Error = StateError;

    fn try_from(raw: RawInstance) -> Result<Self> {
        let attributes = match (raw.attributes, raw.attributes_flat) {
            (Some(attributes), _) => attributes,
            (None, Some(flat)) => serde_json::to_value(flat)?,
            (None, None) => serde_json::Value::Object(serde_json::Map::new()),
        };
        if !attributes.is_object() {
            return Err(StateError::Invalid(
                "resource instance attributes must be a JSON object".to_string(),
            ));
        }

        let private = match raw.private.as_deref() {
            Some(encoded) if !encoded.is_empty() => BASE64
                .decode(encoded)
                .map_err(|e| StateError::Invalid(format!("private data is not base64: {}", e)))?,
            _ => Vec::new(),
        };

        Ok(Self {
            schema_version: raw.schema_version,
            attributes,
            private,
        })
    }
}

/// Identifier of a remote object as recorded in its `id` attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terraform falls back to the resource type prefix when no provider is recorded
fn implied_provider(resource_type: &str) -> Option<String> {
    resource_type
        .split('_')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Deserialize)]
struct IdField {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u64,
}

#[derive(Deserialize)]
struct RawState {
    #[serde(default)]
    terraform_version: Option<String>,
    #[serde(default)]
    serial: u64,
    #[serde(default)]
    lineage: Option<String>,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Deserialize)]
struct RawResource {
    #[serde(default)]
    module: Option<String>,
    mode: ResourceMode,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    instances: Vec<RawInstance>,
}

#[derive(Deserialize)]
struct RawInstance {
    #[serde(default)]
    index_key: Option<RawIndexKey>,
    #[serde(default)]
    schema_version: u64,
    #[serde(default)]
    attributes: Option<serde_json::Value>,
    #[serde(default)]
    attributes_flat: Option<BTreeMap<String, String>>,
    #[serde(default)]
    private: Option<String>,
    #[serde(default)]
    deposed: Option<String>,
}

#[derive(Deserialize, Clone)]
#[serde(untagged)]
enum RawIndexKey {
    Int(i64),
    String(String),
}

impl From<RawIndexKey> for InstanceKey {
    fn from(raw: RawIndexKey) -> Self {
        match raw {
            RawIndexKey::Int(i) => InstanceKey::Int(i),
            RawIndexKey::String(s) => InstanceKey::String(s),
        }
    }
}
