//! Provider schemas
//!
//! Only the parts terradozer relies on are kept: the names of top-level
//! attributes and nested blocks, plus each attribute's declared type.

use std::collections::{BTreeMap, HashMap};

/// Declared type of a schema attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    Bool,
    Number,
    String,
    Dynamic,
    /// Collection and structural types in their JSON type notation
    Complex(serde_json::Value),
}

impl AttributeType {
    /// Parse the JSON type notation used by the plugin protocol,
    /// e.g. `"bool"` or `["list","string"]`.
    pub fn from_json(raw: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(raw) {
            Ok(serde_json::Value::String(name)) => match name.as_str() {
                "bool" => AttributeType::Bool,
                "number" => AttributeType::Number,
                "string" => AttributeType::String,
                _ => AttributeType::Dynamic,
            },
            Ok(other) => AttributeType::Complex(other),
            Err(_) => AttributeType::Dynamic,
        }
    }
}

/// A configuration block: attributes and nested block types
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaBlock {
    pub attributes: BTreeMap<String, AttributeType>,
    pub block_types: BTreeMap<String, SchemaBlock>,
}

impl SchemaBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attributes.insert(name.into(), ty);
        self
    }

    pub fn with_block(mut self, name: impl Into<String>, block: SchemaBlock) -> Self {
        self.block_types.insert(name.into(), block);
        self
    }

    pub fn attribute_type(&self, name: &str) -> Option<&AttributeType> {
        self.attributes.get(name)
    }

    /// Whether `name` is a top-level attribute or nested block
    pub fn declares(&self, name: &str) -> bool {
        self.attributes.contains_key(name) || self.block_types.contains_key(name)
    }

    /// All top-level names, attributes first
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .keys()
            .chain(self.block_types.keys())
            .map(String::as_str)
    }
}

/// Schemas of a provider's own configuration and of its resource types
#[derive(Debug, Clone, Default)]
pub struct ProviderSchema {
    pub provider: SchemaBlock,
    pub resources: HashMap<String, SchemaBlock>,
}

impl ProviderSchema {
    pub fn resource(&self, resource_type: &str) -> Option<&SchemaBlock> {
        self.resources.get(resource_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Schema types decode from their JSON form
    #[test]
    fn test_attribute_type_from_json() {
        assert_eq!(AttributeType::from_json(br#""bool""#), AttributeType::Bool);
        assert_eq!(AttributeType::from_json(br#""string""#), AttributeType::String);
        assert_eq!(AttributeType::from_json(br#""dynamic""#), AttributeType::Dynamic);
        assert_eq!(
            AttributeType::from_json(br#"["set","string"]"#),
            AttributeType::Complex(serde_json::json!(["set", "string"]))
        );
        assert_eq!(AttributeType::from_json(b"garbage"), AttributeType::Dynamic);
    }

    /// Block names cover attributes and nested blocks
    #[test]
    fn test_block_names() {
        let block = SchemaBlock::new()
            .with_attribute("region", AttributeType::String)
            .with_block("assume_role", SchemaBlock::new());
        let names: Vec<&str> = block.names().collect();
        assert_eq!(names, vec!["region", "assume_role"]);
        assert!(block.declares("assume_role"));
        assert!(!block.declares("profile"));
    }
}
