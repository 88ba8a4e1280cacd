//! JSON-Schema rewriting for constrained vendor dialects.
//!
//! Google's function declarations accept a restricted OpenAPI-style
//! schema: no `const`, and `anyOf` only in limited forms. Tool schemas
//! generated from enums typically arrive as `anyOf: [{const: "a"}, ...]`,
//! which [`sanitize_schema`] rewrites into the equivalent
//! `{type, enum: [...]}`.
//!
//! Rules, applied recursively:
//!
//! - non-objects and `{}` pass through; a top-level array is sanitized
//!   element-wise;
//! - `const` is stripped;
//! - `anyOf` is flattened first: an item whose own `anyOf` lists only
//!   const-literals is spliced into the outer list;
//! - a flattened `anyOf` of only const items collapses to
//!   `{type, enum}` keeping the parent's `description`;
//! - any other `anyOf` is kept with each item sanitized;
//! - recursion follows `properties` and single-schema `items`. Tuple
//!   `items` arrays are left alone.
//!
//! The function is pure and idempotent.

use serde_json::{Map, Value};

/// Rewrites `schema` into the Google function-declaration dialect.
///
/// ```rust
/// use serde_json::json;
/// use llm_relay_core::schema::sanitize_schema;
///
/// let schema = json!({
///     "description": "Units",
///     "anyOf": [{"const": "metric", "type": "string"}, {"const": "imperial", "type": "string"}]
/// });
/// assert_eq!(
///     sanitize_schema(&schema),
///     json!({"type": "string", "enum": ["metric", "imperial"], "description": "Units"})
/// );
/// ```
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        Value::Object(map) if map.is_empty() => schema.clone(),
        Value::Object(map) => sanitize_object(map),
        _ => schema.clone(),
    }
}

fn sanitize_object(map: &Map<String, Value>) -> Value {
    let mut any_of = None;
    if let Some(Value::Array(items)) = map.get("anyOf") {
        let flattened = flatten_any_of(items);
        if let Some(collapsed) = collapse_consts(&flattened, map.get("description")) {
            return collapsed;
        }
        any_of = Some(Value::Array(flattened.iter().map(sanitize_schema).collect()));
    }

    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            "const" => {}
            "anyOf" => {
                if let Some(items) = any_of.take() {
                    out.insert(key.clone(), items);
                } else {
                    out.insert(key.clone(), value.clone());
                }
            }
            "properties" => {
                let props = match value {
                    Value::Object(props) => Value::Object(
                        props
                            .iter()
                            .map(|(name, prop)| (name.clone(), sanitize_schema(prop)))
                            .collect(),
                    ),
                    other => other.clone(),
                };
                out.insert(key.clone(), props);
            }
            "items" if value.is_object() => {
                out.insert(key.clone(), sanitize_schema(value));
            }
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(out)
}

fn is_const(item: &Value) -> bool {
    item.as_object().is_some_and(|obj| obj.contains_key("const"))
}

/// Splices in nested `anyOf` lists made entirely of const-literals.
/// Mixed nested lists stay as a single item.
fn flatten_any_of(items: &[Value]) -> Vec<Value> {
    let mut flattened = Vec::with_capacity(items.len());
    for item in items {
        match item.get("anyOf") {
            Some(Value::Array(inner)) if !inner.is_empty() && inner.iter().all(is_const) => {
                flattened.extend(inner.iter().cloned());
            }
            _ => flattened.push(item.clone()),
        }
    }
    flattened
}

fn collapse_consts(items: &[Value], description: Option<&Value>) -> Option<Value> {
    if items.is_empty() || !items.iter().all(is_const) {
        return None;
    }
    let ty = items[0]
        .get("type")
        .cloned()
        .unwrap_or_else(|| Value::String("string".into()));
    let values: Vec<Value> = items
        .iter()
        .filter_map(|item| item.get("const").cloned())
        .collect();

    let mut out = Map::new();
    out.insert("type".into(), ty);
    out.insert("enum".into(), Value::Array(values));
    if let Some(description) = description {
        out.insert("description".into(), description.clone());
    }
    Some(Value::Object(out))
}
