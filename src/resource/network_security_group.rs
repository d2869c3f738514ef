//! azurestack_network_security_group

use super::Resource;
use crate::arm::client::{normalize_location, provisioning_state, ArmClient};
use crate::arm::error::{ProviderError, ProviderResult};
use crate::arm::id::NetworkSecurityGroupId;
use crate::arm::types::{NetworkSecurityGroup, SecurityGroupProperties, SecurityRule, SecurityRuleProperties};
use crate::state::ResourceData;
use crate::tags;
use crate::timeouts::StopContext;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub const TYPE_NAME: &str = "azurestack_network_security_group";

const PROTOCOLS: &[&str] = &["*", "Tcp", "Udp", "Icmp"];
const ACCESSES: &[&str] = &["Allow", "Deny"];
const DIRECTIONS: &[&str] = &["Inbound", "Outbound"];

pub struct NetworkSecurityGroupResource;

impl NetworkSecurityGroupResource {
    fn url(client: &ArmClient, id: &NetworkSecurityGroupId) -> String {
        client.resource_id_url(&id.id(), &client.api_versions.network)
    }

    async fn create_or_update(
        &self,
        client: &ArmClient,
        data: &mut ResourceData,
        stop: &StopContext,
    ) -> ProviderResult<()> {
        let name = data.get_str("name").to_string();
        let resource_group = data.get_str("resource_group_name").to_string();
        let id = NetworkSecurityGroupId::new(&client.subscription_id, &resource_group, &name);
        let url = Self::url(client, &id);

        if data.is_new_resource() {
            match client.get(&url).await {
                Ok(_) => {
                    return Err(ProviderError::RequiresImport {
                        resource_type: TYPE_NAME.to_string(),
                        id: id.id(),
                    })
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Err(err.context(&format!(
                        "checking for presence of existing NSG {:?} (Resource Group {:?})",
                        name, resource_group
                    )))
                }
            }
        }

        let group = NetworkSecurityGroup {
            name: Some(name.clone()),
            location: Some(normalize_location(data.get_str("location"))),
            tags: Some(tags::expand(data.get("tags"))),
            properties: Some(SecurityGroupProperties {
                security_rules: expand_security_rules(data.get_list("security_rule")),
                provisioning_state: None,
            }),
            ..Default::default()
        };
        let body = serde_json::to_value(&group).map_err(|e| ProviderError::decode("network security group", e))?;

        tracing::info!("Creating/updating NSG {:?} (Resource Group {:?})", name, resource_group);
        stop.check()?;
        let response = client.put(&url, &body).await.map_err(|e| {
            e.context(&format!(
                "creating/updating NSG {:?} (Resource Group {:?})",
                name, resource_group
            ))
        })?;

        if provisioning_state(&response.body) != Some("Succeeded") {
            client.wait_for_provisioning(&url, stop).await.map_err(|e| {
                e.context(&format!(
                    "waiting for the completion of NSG {:?} (Resource Group {:?})",
                    name, resource_group
                ))
            })?;
        }

        data.set_id(id.id());
        self.read(client, data, stop).await
    }
}

#[async_trait]
impl Resource for NetworkSecurityGroupResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn validate_id(&self, id: &str) -> ProviderResult<()> {
        NetworkSecurityGroupId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        self.create_or_update(client, data, stop).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        let id = NetworkSecurityGroupId::parse(data.id())?;
        stop.check()?;

        let body = match client.get(&Self::url(client, &id)).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => {
                tracing::info!("NSG {:?} was not found - removing from state", id.name);
                data.clear_id();
                return Ok(());
            }
            Err(err) => {
                return Err(err.context(&format!(
                    "retrieving NSG {:?} (Resource Group {:?})",
                    id.name, id.resource_group
                )))
            }
        };

        let group: NetworkSecurityGroup =
            serde_json::from_value(body).map_err(|e| ProviderError::decode("network security group", e))?;

        data.set("name", id.name.clone());
        data.set("resource_group_name", id.resource_group.clone());
        if let Some(location) = group.location.as_deref() {
            data.set("location", normalize_location(location));
        }
        let rules = group
            .properties
            .as_ref()
            .map(|p| p.security_rules.as_slice())
            .unwrap_or(&[]);
        data.set("security_rule", flatten_security_rules(rules));
        tags::flatten_and_set(data, group.tags.as_ref());

        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        self.create_or_update(client, data, stop).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        let id = NetworkSecurityGroupId::parse(data.id())?;
        let url = Self::url(client, &id);
        stop.check()?;

        tracing::info!("Deleting NSG {:?} (Resource Group {:?})", id.name, id.resource_group);
        let response = match client.delete(&url).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => {
                return Err(err.context(&format!(
                    "deleting NSG {:?} (Resource Group {:?})",
                    id.name, id.resource_group
                )))
            }
        };

        if response.status == 202 {
            client.wait_for_deletion(&url, stop).await.map_err(|e| {
                e.context(&format!(
                    "waiting for the deletion of NSG {:?} (Resource Group {:?})",
                    id.name, id.resource_group
                ))
            })?;
        }

        Ok(())
    }
}

/// Match `value` case-insensitively against `allowed`, returning the canonical spelling
fn canonical(value: &str, allowed: &[&str]) -> String {
    allowed
        .iter()
        .find(|a| a.eq_ignore_ascii_case(value))
        .map(|a| a.to_string())
        .unwrap_or_else(|| value.to_string())
}

fn optional_str(rule: &Map<String, Value>, key: &str) -> Option<String> {
    rule.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `security_rule` blocks -> ARM security rules
pub fn expand_security_rules(blocks: &[Value]) -> Vec<SecurityRule> {
    blocks
        .iter()
        .filter_map(|v| v.as_object())
        .map(|rule| {
            let text = |key: &str| rule.get(key).and_then(|v| v.as_str()).unwrap_or("");

            SecurityRule {
                id: None,
                name: optional_str(rule, "name"),
                properties: Some(SecurityRuleProperties {
                    description: optional_str(rule, "description"),
                    protocol: canonical(text("protocol"), PROTOCOLS),
                    source_port_range: optional_str(rule, "source_port_range"),
                    destination_port_range: optional_str(rule, "destination_port_range"),
                    source_address_prefix: optional_str(rule, "source_address_prefix"),
                    destination_address_prefix: optional_str(rule, "destination_address_prefix"),
                    access: canonical(text("access"), ACCESSES),
                    priority: rule
                        .get("priority")
                        .and_then(|v| v.as_i64())
                        .and_then(|p| i32::try_from(p).ok())
                        .unwrap_or_default(),
                    direction: canonical(text("direction"), DIRECTIONS),
                    provisioning_state: None,
                }),
            }
        })
        .collect()
}

/// ARM security rules -> `security_rule` blocks
pub fn flatten_security_rules(rules: &[SecurityRule]) -> Value {
    let blocks = rules
        .iter()
        .map(|rule| {
            let props = rule.properties.clone().unwrap_or_default();
            json!({
                "name": rule.name.clone().unwrap_or_default(),
                "description": props.description.unwrap_or_default(),
                "protocol": props.protocol,
                "source_port_range": props.source_port_range.unwrap_or_default(),
                "destination_port_range": props.destination_port_range.unwrap_or_default(),
                "source_address_prefix": props.source_address_prefix.unwrap_or_default(),
                "destination_address_prefix": props.destination_address_prefix.unwrap_or_default(),
                "access": props.access,
                "priority": props.priority,
                "direction": props.direction,
            })
        })
        .collect();
    Value::Array(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, priority: i32) -> SecurityRule {
        SecurityRule {
            id: None,
            name: Some(name.to_string()),
            properties: Some(SecurityRuleProperties {
                description: Some("allow ssh".to_string()),
                protocol: "Tcp".to_string(),
                source_port_range: Some("*".to_string()),
                destination_port_range: Some("22".to_string()),
                source_address_prefix: Some("*".to_string()),
                destination_address_prefix: None,
                access: "Allow".to_string(),
                priority,
                direction: "Inbound".to_string(),
                provisioning_state: None,
            }),
        }
    }

    #[test]
    fn test_expand_flatten_round_trip() {
        let rules = vec![rule("ssh", 100), rule("other", 200)];
        let flattened = flatten_security_rules(&rules);
        let blocks = flattened.as_array().unwrap();
        assert_eq!(expand_security_rules(blocks), rules);
    }

    #[test]
    fn test_expand_canonicalizes_case() {
        let blocks = vec![json!({
            "name": "r",
            "protocol": "tcp",
            "access": "deny",
            "direction": "outbound",
            "priority": 4096,
        })];
        let rules = expand_security_rules(&blocks);
        let props = rules[0].properties.as_ref().unwrap();
        assert_eq!(props.protocol, "Tcp");
        assert_eq!(props.access, "Deny");
        assert_eq!(props.direction, "Outbound");
        assert_eq!(props.priority, 4096);
        assert!(props.description.is_none());
    }

    #[test]
    fn test_flatten_fills_missing_fields() {
        let flattened = flatten_security_rules(&[SecurityRule::default()]);
        assert_eq!(flattened[0]["name"], "");
        assert_eq!(flattened[0]["source_port_range"], "");
        assert_eq!(flattened[0]["priority"], 0);
    }

    #[test]
    fn test_validate_id() {
        let resource = NetworkSecurityGroupResource;
        assert!(resource
            .validate_id("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkSecurityGroups/n")
            .is_ok());
        assert!(resource
            .validate_id("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/dnszones/z/TXT/n")
            .is_err());
    }
}
