//! Structural type checks shared by the validator and the scheduler.

use meshflow_types::service::{FieldType, Schema};
use serde_json::Value;

/// The most specific `FieldType` describing a JSON value.
pub fn value_type(value: &Value) -> FieldType {
    match value {
        Value::Null => FieldType::Null,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
        Value::Number(_) => FieldType::Number,
        Value::String(_) => FieldType::String,
        Value::Array(_) => FieldType::Array,
        Value::Object(_) => FieldType::Object,
    }
}

/// Whether a value declared as `found` may flow into a slot declared as `expected`.
pub fn is_assignable(found: FieldType, expected: FieldType) -> bool {
    found == expected
        || found == FieldType::Any
        || expected == FieldType::Any
        || (found == FieldType::Integer && expected == FieldType::Number)
}

/// Whether a concrete value satisfies a declared field type.
pub fn value_matches(value: &Value, expected: FieldType) -> bool {
    is_assignable(value_type(value), expected)
}

/// Check a value against a schema. Open schemas accept anything.
///
/// Returns a description of the first violation found.
pub fn check_conformance(value: &Value, schema: &Schema) -> Result<(), String> {
    if schema.is_open() {
        return Ok(());
    }
    let Value::Object(map) = value else {
        return Err(format!("expected an object, found {}", value_type(value)));
    };
    for field in &schema.required {
        if !map.contains_key(field) {
            return Err(format!("missing required field '{field}'"));
        }
    }
    for (field, property) in &schema.properties {
        if let Some(v) = map.get(field) {
            if !value_matches(v, property.field_type) {
                return Err(format!(
                    "field '{field}' expected {}, found {}",
                    property.field_type,
                    value_type(v)
                ));
            }
        }
    }
    Ok(())
}
