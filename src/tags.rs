//! Tags
//!
//! Expand/flatten between the generic `tags` attribute and ARM tag maps,
//! plus the limits ARM enforces on them.

use crate::arm::types::Tags;
use crate::state::ResourceData;
use serde_json::{Map, Value};

const MAX_TAGS: usize = 50;
const MAX_KEY_LENGTH: usize = 512;
const MAX_VALUE_LENGTH: usize = 256;

/// Generic `tags` attribute -> ARM tag map
pub fn expand(value: Option<&Value>) -> Tags {
    value
        .and_then(|v| v.as_object())
        .map(|m| {
            m.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k.clone(), Some(v))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// ARM tag map -> generic `tags` attribute; `null` values are dropped
pub fn flatten(tags: Option<&Tags>) -> Value {
    let map: Map<String, Value> = tags
        .map(|t| {
            t.iter()
                .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), Value::String(v.clone()))))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(map)
}

pub fn flatten_and_set(data: &mut ResourceData, tags: Option<&Tags>) {
    data.set("tags", flatten(tags));
}

/// Violations of the ARM tag limits, one message per problem
pub fn validate(path: &str, value: &Value) -> Vec<String> {
    let Some(map) = value.as_object() else {
        return vec![format!("{}: expected a map of tags", path)];
    };

    let mut errors = Vec::new();
    if map.len() > MAX_TAGS {
        errors.push(format!(
            "{}: a maximum of {} tags can be applied to each resource",
            path, MAX_TAGS
        ));
    }

    for (key, value) in map {
        if key.chars().count() > MAX_KEY_LENGTH {
            errors.push(format!(
                "{}: the maximum length for a tag key is {} characters: {:?}",
                path, MAX_KEY_LENGTH, key
            ));
        }

        match value {
            Value::String(s) if s.chars().count() > MAX_VALUE_LENGTH => errors.push(format!(
                "{}: the maximum length for a tag value is {} characters: {:?}",
                path, MAX_VALUE_LENGTH, key
            )),
            Value::Object(_) | Value::Array(_) => {
                errors.push(format!("{}.{}: tag values must be scalars", path, key))
            }
            _ => {}
        }
    }

    errors
}
