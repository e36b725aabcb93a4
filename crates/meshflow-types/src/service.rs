//! Service registry entries and their structural schemas.
//!
//! A `ServiceDescriptor` is what the service directory hands back for a name.
//! Schemas follow a small JSON-Schema-like shape:
//!
//! ```json
//! {
//!   "type": "object",
//!   "properties": { "id": { "type": "integer" } },
//!   "required": ["id"]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ServiceDescriptor
// ---------------------------------------------------------------------------

/// A registered microservice that graph nodes may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique registry key.
    pub name: String,
    /// Primary endpoint URL.
    pub endpoint: String,
    /// Shape of the request body the service expects.
    #[serde(default)]
    pub input_schema: Schema,
    /// Shape of the response body the service produces.
    #[serde(default)]
    pub output_schema: Schema,
    /// Advisory cost per call (not used for scheduling).
    #[serde(default)]
    pub cost: f64,
    /// Alternate endpoints, tried in order after the primary is exhausted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_endpoints: Vec<String>,
    /// Attempts per endpoint. Falls back to the engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,
    /// Per-attempt timeout in milliseconds. Falls back to the engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ServiceDescriptor {
    /// Create a descriptor with open schemas and no fallbacks.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            input_schema: Schema::default(),
            output_schema: Schema::default(),
            cost: 0.0,
            fallback_endpoints: Vec::new(),
            retry_limit: None,
            timeout_ms: None,
        }
    }

    pub fn with_input_schema(mut self, schema: Schema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: Schema) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn with_fallbacks<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = Some(limit);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Structural description of a JSON object.
///
/// A schema without properties is *open*: it places no constraint on values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Declared fields keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertySchema>,
    /// Fields that must be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Schema {
    /// An open schema (accepts anything).
    pub fn open() -> Self {
        Self::default()
    }

    /// Add an optional property.
    pub fn property(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.properties
            .insert(name.into(), PropertySchema { field_type });
        self
    }

    /// Add a required property.
    pub fn required_property(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.property(name, field_type)
    }

    /// Whether this schema places no constraint on values.
    pub fn is_open(&self) -> bool {
        self.properties.is_empty() && self.required.is_empty()
    }

    /// Declared type of a field, if any.
    ///
    /// A field listed in `required` without a property entry is `any`.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        match self.properties.get(name) {
            Some(property) => Some(property.field_type),
            None if self.is_required(name) => Some(FieldType::Any),
            None => None,
        }
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// A single declared property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

/// JSON value types understood by the schema checker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
    #[default]
    Any,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Null => "null",
            FieldType::Any => "any",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
