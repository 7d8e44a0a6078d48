//! Model and property descriptors.

use serde::{Deserialize, Serialize};

/// The type of a model property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// UTF-8 string.
    String,
    /// 64-bit float.
    Number,
    /// Boolean.
    Boolean,
}

impl PropertyType {
    /// Returns the stable string rendering used in the schema hash.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
        }
    }
}

/// A single typed property of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMeta {
    /// Property name.
    pub name: String,
    /// Property type.
    #[serde(rename = "type")]
    pub prop_type: PropertyType,
    /// Whether a secondary index is maintained for this property.
    #[serde(default)]
    pub indexed: bool,
    /// Whether the property may be absent or null.
    #[serde(default)]
    pub nullable: bool,
}

impl PropertyMeta {
    /// Creates a non-indexed, non-nullable property.
    pub fn new(name: impl Into<String>, prop_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            prop_type,
            indexed: false,
            nullable: false,
        }
    }

    /// Marks the property as indexed.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Marks the property as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Returns the canonical `name:type:indexed:nullable` rendering.
    pub fn canonical(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.name,
            self.prop_type.as_str(),
            self.indexed,
            self.nullable
        )
    }
}

/// Static description of a synced entity type.
///
/// Immutable once registered for a process lifetime. The ordered property
/// list determines which secondary indexes the local cache maintains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMeta {
    /// Model name, unique within a registry.
    pub name: String,
    /// Ordered list of typed properties.
    pub properties: Vec<PropertyMeta>,
}

impl ModelMeta {
    /// Creates a model descriptor.
    pub fn new(name: impl Into<String>, properties: Vec<PropertyMeta>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    /// Returns the names of all indexed properties.
    pub fn indexed_properties(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|p| p.indexed)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Returns the canonical rendering used in the schema hash.
    ///
    /// Properties are sorted by name so that declaration order does not
    /// affect the fingerprint.
    pub fn canonical(&self) -> String {
        let mut props: Vec<String> = self.properties.iter().map(|p| p.canonical()).collect();
        props.sort();
        format!("{}{{{}}}", self.name, props.join(","))
    }
}
