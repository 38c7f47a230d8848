//! Resource instance addresses

use serde::Deserialize;
use std::fmt;

/// Whether a resource block manages infrastructure or only reads it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceMode {
    /// Declared by a `resource` block
    Managed,
    /// Declared by a `data` block
    Data,
}

impl fmt::Display for ResourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceMode::Managed => write!(f, "managed"),
            ResourceMode::Data => write!(f, "data"),
        }
    }
}

/// Repetition key of a resource declared with `count` or `for_each`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstanceKey {
    Int(i64),
    String(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Int(i) => write!(f, "[{}]", i),
            InstanceKey::String(s) => write!(f, "[{:?}]", s),
        }
    }
}

/// Absolute address of one resource instance, e.g.
/// `module.vpc.aws_subnet.private[1]` or `data.aws_ami.ubuntu`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceInstanceAddress {
    module: String,
    mode: ResourceMode,
    resource_type: String,
    name: String,
    key: Option<InstanceKey>,
}

impl ResourceInstanceAddress {
    pub fn new(
        mode: ResourceMode,
        resource_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            module: String::new(),
            mode,
            resource_type: resource_type.into(),
            name: name.into(),
            key: None,
        }
    }

    /// Place the address inside a module instance path (`module.a.module.b`)
    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn with_key(mut self, key: InstanceKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Module instance path; empty for the root module
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn mode(&self) -> ResourceMode {
        self.mode
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> Option<&InstanceKey> {
        self.key.as_ref()
    }

    pub fn is_managed(&self) -> bool {
        self.mode == ResourceMode::Managed
    }
}

impl fmt::Display for ResourceInstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_empty() {
            write!(f, "{}.", self.module)?;
        }
        if self.mode == ResourceMode::Data {
            write!(f, "data.")?;
        }
        write!(f, "{}.{}", self.resource_type, self.name)?;
        if let Some(key) = &self.key {
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

/// Extract the provider type name from a provider configuration address as
/// written in state files.
///
/// Handles `provider["registry.terraform.io/hashicorp/aws"]`, the legacy
/// `provider.aws`, aliases (`provider.aws.west`) and module-qualified forms
/// (`module.vpc.provider.aws`).
pub fn provider_type_name(raw: &str) -> Option<String> {
    let start = raw.match_indices("provider").find_map(|(idx, _)| {
        let before = &raw[..idx];
        let after = &raw[idx + "provider".len()..];
        let at_segment = before.is_empty() || before.ends_with('.');
        let is_module_name = before.ends_with("module.");
        let followed = after.starts_with('[') || after.starts_with('.');
        (at_segment && !is_module_name && followed).then_some(after)
    })?;

    let name = if let Some(quoted) = start.strip_prefix("[\"") {
        let source = &quoted[..quoted.find("\"]")?];
        source.rsplit('/').next()?
    } else {
        start.strip_prefix('.')?.split('.').next()?
    };

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
