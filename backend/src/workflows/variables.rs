// Variable Substitution - {{identifier}} templating over trigger payloads

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(\w+)\}\}").expect("variable token pattern is valid")
});

/// Replace every `{{identifier}}` with the string form of `data[identifier]`.
///
/// Tokens whose identifier is absent from `data` are left in place verbatim.
pub fn replace_variables(template: &str, data: &Value) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    TOKEN
        .replace_all(template, |caps: &Captures| match data.get(&caps[1]) {
            Some(value) => value_to_string(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Substitute variables in every string nested inside `value`.
pub fn replace_variables_in_value(value: &Value, data: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(replace_variables(s, data)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| replace_variables_in_value(v, data))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), replace_variables_in_value(v, data)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// String coercion shared by templating and string-based condition operators.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}
