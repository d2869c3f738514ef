//! Resource state
//!
//! The generic attribute representation shared by every handler, the
//! configuration blocks it is built from, and the JSON state file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Current state file format version
const STATE_VERSION: u32 = 1;

/// Attribute map of one resource or data source instance
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceData {
    #[serde(rename = "type")]
    pub type_name: String,
    /// Empty until created; cleared when the remote object is gone
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(skip)]
    new_resource: bool,
}

impl ResourceData {
    pub fn new(type_name: &str, attributes: Map<String, Value>) -> Self {
        Self {
            type_name: type_name.to_string(),
            id: String::new(),
            attributes,
            new_resource: false,
        }
    }

    /// Data for a resource that is about to be created
    pub fn for_create(type_name: &str, attributes: Map<String, Value>) -> Self {
        Self {
            new_resource: true,
            ..Self::new(type_name, attributes)
        }
    }

    /// Data holding only an ID (import, refresh of a bare ID)
    pub fn from_id(type_name: &str, id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::new(type_name, Map::new())
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Mark the remote object as gone
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    pub fn is_gone(&self) -> bool {
        self.id.is_empty()
    }

    pub fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    /// String attribute, or "" when unset
    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).and_then(|v| v.as_str()).unwrap_or("")
    }

    /// Non-empty string attribute
    pub fn get_optional_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    /// List or set attribute; a missing attribute is an empty list
    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Map-of-string attribute; non-string values are skipped
    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.get(key)
            .and_then(|v| v.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_string(), value.into());
    }
}

/// A declarative configuration block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigBlock {
    /// Resource or data source type, e.g. `azurestack_network_security_group`
    #[serde(rename = "type")]
    pub type_name: String,
    /// Local label, unique per type
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl ConfigBlock {
    /// State address: `<type>.<name>`
    pub fn address(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlockFile {
    Many(Vec<ConfigBlock>),
    One(ConfigBlock),
}

/// Parse one block or a sequence of blocks from YAML (JSON is valid YAML)
pub fn parse_blocks(content: &str) -> Result<Vec<ConfigBlock>> {
    let parsed: BlockFile =
        serde_yaml::from_str(content).context("Failed to parse configuration blocks")?;
    Ok(match parsed {
        BlockFile::Many(blocks) => blocks,
        BlockFile::One(block) => vec![block],
    })
}

/// Persisted state of every managed object, keyed by address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateFile {
    pub version: u32,
    /// RFC 3339 time of the last change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceData>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: None,
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Load state from disk; a missing file is an empty state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {:?}", path))?;
        let state: StateFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file {:?}", path))?;

        if state.version > STATE_VERSION {
            anyhow::bail!(
                "State file {:?} has version {}, newer than supported version {}",
                path,
                state.version,
                STATE_VERSION
            );
        }

        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write state file {:?}", path))?;
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&ResourceData> {
        self.resources.get(address)
    }

    pub fn put(&mut self, address: String, data: ResourceData) {
        self.resources.insert(address, data);
        self.touch();
    }

    pub fn remove(&mut self, address: &str) -> Option<ResourceData> {
        let removed = self.resources.remove(address);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    fn touch(&mut self) {
        self.updated_at = Some(chrono::Utc::now().to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_getters_default_when_missing() {
        let data = ResourceData::new("t", Map::new());
        assert_eq!(data.get_str("name"), "");
        assert_eq!(data.get_i64("ttl", 300), 300);
        assert!(data.get_list("record").is_empty());
        assert!(data.get_string_map("tags").is_empty());
        assert!(data.get_optional_str("name").is_none());
    }

    #[test]
    fn test_null_attributes_count_as_unset() {
        let mut data = ResourceData::new("t", Map::new());
        data.set("name", Value::Null);
        assert!(data.get("name").is_none());
    }

    #[test]
    fn test_string_map_skips_non_strings() {
        let mut data = ResourceData::new("t", Map::new());
        data.set("tags", json!({"env": "prod", "n": 1}));
        let tags = data.get_string_map("tags");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags["env"], "prod");
    }

    #[test]
    fn test_clear_id_marks_gone() {
        let mut data = ResourceData::from_id("t", "/subscriptions/x");
        assert!(!data.is_gone());
        data.clear_id();
        assert!(data.is_gone());
    }

    #[test]
    fn test_parse_single_and_multiple_blocks() {
        let one = parse_blocks(
            r#"
type: azurestack_dns_txt_record
name: test
config:
  ttl: 300
"#,
        )
        .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].address(), "azurestack_dns_txt_record.test");
        assert_eq!(one[0].config["ttl"], json!(300));

        let many = parse_blocks(
            r#"
- type: a
  name: one
- type: b
  name: two
"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn test_state_file_round_trip() {
        let path = std::env::temp_dir().join(format!("azstack-state-{}.json", uuid::Uuid::new_v4()));
        let mut state = StateFile::default();
        let mut data = ResourceData::from_id("t", "/id");
        data.set("name", "n");
        state.put("t.n".into(), data.clone());
        state.save(&path).unwrap();

        let loaded = StateFile::load(&path).unwrap();
        assert_eq!(loaded.get("t.n"), Some(&data));
        assert!(loaded.updated_at.is_some());
        std::fs::remove_file(&path).unwrap();
    }
}
