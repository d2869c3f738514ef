//! Schema Registry - Load resource and data source schemas from JSON
//!
//! Schemas are declared in JSON files embedded at compile time and parsed
//! once on first access. Configuration blocks are validated against them
//! before any handler runs.

use crate::arm::client::normalize_location;
use crate::arm::error::{ProviderError, ProviderResult};
use crate::tags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded schema JSON files (compiled into the binary)
const SCHEMA_FILES: &[&str] = &[
    include_str!("schemas/network_security_group.json"),
    include_str!("schemas/dns_txt_record.json"),
    include_str!("schemas/resources.json"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    String,
    Int,
    Bool,
    Map,
    List,
    Set,
}

/// Value check attached to an attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validation {
    NotEmpty,
    StringLenBetween {
        min: usize,
        max: usize,
    },
    IntBetween {
        min: i64,
        max: i64,
    },
    StringInSlice {
        values: Vec<String>,
        #[serde(default)]
        ignore_case: bool,
    },
    Tags,
}

impl Validation {
    /// Error message if `value` fails the check
    fn check(&self, path: &str, value: &Value) -> Vec<String> {
        match self {
            Validation::NotEmpty => match value.as_str() {
                Some(s) if s.trim().is_empty() => vec![format!("{}: must not be empty", path)],
                _ => vec![],
            },
            Validation::StringLenBetween { min, max } => match value.as_str() {
                Some(s) if !(*min..=*max).contains(&s.chars().count()) => vec![format!(
                    "{}: expected length to be in the range ({} - {}), got {}",
                    path,
                    min,
                    max,
                    s.chars().count()
                )],
                _ => vec![],
            },
            Validation::IntBetween { min, max } => match value.as_i64() {
                Some(n) if !(*min..=*max).contains(&n) => vec![format!(
                    "{}: expected to be in the range ({} - {}), got {}",
                    path, min, max, n
                )],
                _ => vec![],
            },
            Validation::StringInSlice { values, ignore_case } => match value.as_str() {
                Some(s) => {
                    let found = values.iter().any(|v| {
                        if *ignore_case {
                            v.eq_ignore_ascii_case(s)
                        } else {
                            v == s
                        }
                    });
                    if found {
                        vec![]
                    } else {
                        vec![format!("{}: expected to be one of {:?}, got {:?}", path, values, s)]
                    }
                }
                None => vec![],
            },
            Validation::Tags => tags::validate(path, value),
        }
    }
}

/// How planned and prior values are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffSuppress {
    Location,
}

/// Attribute definition from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub attr_type: AttrType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub force_new: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_suppress: Option<DiffSuppress>,
    /// Nested block schema for list/set attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elem: Option<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

impl Attribute {
    /// Computed-only attributes cannot be set from configuration
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    /// Whether `prior` and `planned` differ under this attribute's diff rules
    fn differs(&self, prior: Option<&Value>, planned: Option<&Value>) -> bool {
        match (self.diff_suppress, prior, planned) {
            (Some(DiffSuppress::Location), Some(Value::String(a)), Some(Value::String(b))) => {
                normalize_location(a) != normalize_location(b)
            }
            _ => prior != planned,
        }
    }
}

/// A set of attributes (top-level schema or nested block)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
}

/// Root structure of schemas/*.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    #[serde(default)]
    pub resources: BTreeMap<String, Block>,
    #[serde(default)]
    pub data_sources: BTreeMap<String, Block>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();

/// Get the schema registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static SchemaRegistry {
    REGISTRY.get_or_init(|| {
        let mut registry = SchemaRegistry::default();

        for content in SCHEMA_FILES {
            let partial: SchemaRegistry = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded schema JSON: {}", e));
            registry.resources.extend(partial.resources);
            registry.data_sources.extend(partial.data_sources);
        }

        registry
    })
}

/// Get a resource schema by type name
pub fn get_resource_schema(type_name: &str) -> Option<&'static Block> {
    get_registry().resources.get(type_name)
}

/// Get a data source schema by type name
pub fn get_data_source_schema(type_name: &str) -> Option<&'static Block> {
    get_registry().data_sources.get(type_name)
}

/// Get all resource and data source type names
pub fn all_type_names() -> Vec<&'static str> {
    let registry = get_registry();
    registry
        .resources
        .keys()
        .chain(registry.data_sources.keys())
        .map(|s| s.as_str())
        .collect()
}

/// Validate a configuration against a schema, reporting every violation
pub fn validate_config(schema: &Block, config: &Map<String, Value>) -> ProviderResult<()> {
    let mut errors = Vec::new();
    validate_block(schema, config, "", &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(errors))
    }
}

fn validate_block(schema: &Block, config: &Map<String, Value>, prefix: &str, errors: &mut Vec<String>) {
    for key in config.keys() {
        if !schema.attributes.contains_key(key) {
            errors.push(format!("{}{}: unsupported argument", prefix, key));
        }
    }

    for (name, attr) in &schema.attributes {
        let path = format!("{}{}", prefix, name);
        let value = config.get(name).filter(|v| !v.is_null());

        let Some(value) = value else {
            if attr.required {
                errors.push(format!("{}: is required", path));
            }
            continue;
        };

        if attr.is_computed_only() {
            errors.push(format!("{}: is computed and cannot be set", path));
            continue;
        }

        if !type_matches(attr.attr_type, value) {
            errors.push(format!("{}: expected type {:?}", path, attr.attr_type));
            continue;
        }

        if let Some(validation) = &attr.validation {
            errors.extend(validation.check(&path, value));
        }

        if let Value::Array(items) = value {
            if let Some(min) = attr.min_items.filter(|min| items.len() < *min) {
                errors.push(format!("{}: at least {} item(s) required", path, min));
            }
            if let Some(max) = attr.max_items.filter(|max| items.len() > *max) {
                errors.push(format!("{}: at most {} item(s) allowed", path, max));
            }

            if let Some(elem) = &attr.elem {
                for (i, item) in items.iter().enumerate() {
                    match item.as_object() {
                        Some(obj) => validate_block(elem, obj, &format!("{}.{}.", path, i), errors),
                        None => errors.push(format!("{}.{}: expected a block", path, i)),
                    }
                }
            }
        }
    }
}

fn type_matches(attr_type: AttrType, value: &Value) -> bool {
    match attr_type {
        AttrType::String => value.is_string(),
        AttrType::Int => value.is_i64() || value.is_u64(),
        AttrType::Bool => value.is_boolean(),
        AttrType::Map => value.is_object(),
        AttrType::List | AttrType::Set => value.is_array(),
    }
}

/// Names of force-new attributes whose planned value differs from the prior one
pub fn force_new_changes(
    schema: &Block,
    prior: &Map<String, Value>,
    planned: &Map<String, Value>,
) -> Vec<String> {
    schema
        .attributes
        .iter()
        .filter(|(_, attr)| attr.force_new)
        .filter(|(name, attr)| {
            let prior = prior.get(*name).filter(|v| !v.is_null());
            let planned = planned.get(*name).filter(|v| !v.is_null());
            attr.differs(prior, planned)
        })
        .map(|(name, _)| name.clone())
        .collect()
}
