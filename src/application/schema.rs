//! JSON-Schema synthesis and strictness post-processing.
//!
//! Grounded on `schemars`'s `JsonSchema` derive for the type-directed
//! conversion itself; the strictness post-processing is our own, since
//! neither the teacher nor the rest of the pack needs it.

use schemars::schema::{Schema, SchemaObject};
use schemars::schema_for;
use schemars::JsonSchema;
use serde_json::Value;

/// Generate a JSON-Schema draft-07 document for `T`, optionally tightening
/// it so extra properties are rejected.
///
/// Returns `None` only if the generated schema cannot be represented as a
/// JSON object, which does not happen for struct-shaped handler inputs.
pub fn generate_schema<T: JsonSchema>(strict_schema: bool) -> Option<Value> {
    let root = schema_for!(T);
    let mut value = serde_json::to_value(&root).ok()?;

    if strict_schema {
        apply_strictness(&mut value);
    }

    Some(value)
}

/// Recursively set `"additionalProperties": false` on every object
/// subschema, including nested `definitions`/`$defs`, so a strict-mode
/// schema rejects payloads carrying fields it does not declare.
fn apply_strictness(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let is_object_schema = map.get("type").map(|t| t == "object").unwrap_or(false) || map.contains_key("properties");
            if is_object_schema && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for nested in map.values_mut() {
                apply_strictness(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                apply_strictness(item);
            }
        }
        _ => {}
    }
}

/// Reconstruct a bare `SchemaObject` into a `Schema` value, used by tests
/// that want to assert on the generated shape without round-tripping
/// through `serde_json::Value` twice.
#[cfg(test)]
fn schema_object_of(value: &Value) -> Option<SchemaObject> {
    serde_json::from_value::<Schema>(value.clone()).ok().and_then(|s| match s {
        Schema::Object(obj) => Some(obj),
        Schema::Bool(_) => None,
    })
}
