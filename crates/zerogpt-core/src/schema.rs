//! JSON schema helpers for tool inputs and structured replies.

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde_json::{Map, Value, json};

/// Generate a self-contained JSON schema for `T`.
///
/// Subschemas are inlined and the `$schema` marker is dropped, which is the
/// form function-calling endpoints accept.
pub fn schema_for<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|settings| {
            settings.inline_subschemas = true;
            settings.meta_schema = None;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    serde_json::to_value(root).unwrap_or(Value::Null)
}

/// Title of a generated schema, if it has one
pub fn schema_title(schema: &Value) -> Option<&str> {
    schema.get("title").and_then(Value::as_str)
}

/// Rewrite a schema into the form strict function calling accepts.
///
/// Every object schema gets `additionalProperties: false` and lists all of
/// its properties in `required`; properties that were optional become
/// nullable instead. Only schema positions are walked, so data keywords
/// such as `default`, `enum` and `examples` are left as they are.
pub fn make_strict(schema: &mut Value) {
    let Value::Object(map) = schema else {
        return;
    };

    if let Some(Value::Object(properties)) = map.get_mut("properties") {
        for property in properties.values_mut() {
            make_strict(property);
        }
    }
    for key in ["items", "additionalProperties"] {
        match map.get_mut(key) {
            Some(Value::Array(items)) => items.iter_mut().for_each(make_strict),
            Some(sub) => make_strict(sub),
            None => {}
        }
    }
    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(Value::Array(subs)) = map.get_mut(key) {
            subs.iter_mut().for_each(make_strict);
        }
    }
    for key in ["definitions", "$defs"] {
        if let Some(Value::Object(defs)) = map.get_mut(key) {
            defs.values_mut().for_each(make_strict);
        }
    }

    if is_object_schema(map) {
        close_object(map);
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    let typed_object = match map.get("type") {
        Some(Value::String(ty)) => ty == "object",
        Some(Value::Array(types)) => types.iter().any(|ty| ty == "object"),
        _ => false,
    };
    typed_object || map.get("properties").is_some_and(Value::is_object)
}

fn required_names(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect()
}

fn close_object(map: &mut Map<String, Value>) {
    map.insert("additionalProperties".into(), Value::Bool(false));

    let required = map
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let Some(Value::Object(properties)) = map.get_mut("properties") else {
        return;
    };

    for (name, property) in properties.iter_mut() {
        if !required.iter().any(|r| r == name.as_str()) {
            make_nullable(property);
        }
    }
    let all: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
    map.insert("required".into(), Value::Array(all));
}

fn make_nullable(schema: &mut Value) {
    if let Value::Object(map) = schema {
        let has_enum = map.contains_key("enum");
        if let Some(Value::Array(values)) = map.get_mut("enum") {
            if !values.contains(&Value::Null) {
                values.push(Value::Null);
            }
        }
        match map.get_mut("type") {
            Some(Value::Array(types)) => {
                if !types.iter().any(|ty| ty == "null") {
                    types.push("null".into());
                }
                return;
            }
            Some(ty) if ty.is_string() => {
                if *ty != "null" {
                    let inner = ty.take();
                    *ty = Value::Array(vec![inner, "null".into()]);
                }
                return;
            }
            _ if has_enum => return,
            _ => {}
        }
    }
    if *schema == Value::Bool(true) {
        return;
    }
    let inner = schema.take();
    *schema = json!({"anyOf": [inner, {"type": "null"}]});
}

/// Remove `null` values standing in for optional properties.
///
/// Strict callers send every property, using `null` for the ones they leave
/// out. Stripping those against the original schema turns them back into
/// absent keys before validation and deserialization.
pub fn drop_optional_nulls(schema: &Value, value: &mut Value) {
    match value {
        Value::Object(object) => {
            let Some(schema) = object_branch(schema) else {
                return;
            };
            let required = required_names(schema);
            object.retain(|name, v| !v.is_null() || required.contains(name));

            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (name, v) in object.iter_mut() {
                    if let Some(sub) = properties.get(name) {
                        drop_optional_nulls(sub, v);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(sub) = schema.get("items").filter(|s| s.is_object()) {
                for item in items {
                    drop_optional_nulls(sub, item);
                }
            }
        }
        _ => {}
    }
}

/// The schema itself when it lists properties, else the first combinator
/// branch that does (`Option<Struct>` renders as `anyOf`).
fn object_branch(schema: &Value) -> Option<&Value> {
    if schema.get("properties").is_some_and(Value::is_object) {
        return Some(schema);
    }
    ["anyOf", "oneOf", "allOf"]
        .iter()
        .filter_map(|key| schema.get(key).and_then(Value::as_array))
        .flatten()
        .find_map(object_branch)
}

/// Check `instance` against `schema`, reporting the first violation.
pub fn validate(schema: &Value, instance: &Value) -> std::result::Result<(), String> {
    let validator =
        jsonschema::validator_for(schema).map_err(|e| format!("invalid JSON schema: {e}"))?;
    if let Some(error) = validator.iter_errors(instance).next() {
        return Err(error.to_string());
    }
    Ok(())
}
