//! Acceptance tests
//!
//! Provision and tear down objects against a simulated ARM endpoint that keeps
//! what it is given in memory, driving everything through [`Provider`] with
//! configuration blocks written the way users write them.

use azstack::arm::auth::ArmCredentials;
use azstack::arm::client::ArmClient;
use azstack::arm::error::ProviderError;
use azstack::config::ProviderConfig;
use azstack::provider::Provider;
use azstack::state::{parse_blocks, ConfigBlock, ResourceData};
use azstack::timeouts::StopContext;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::path_regex;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const SUBSCRIPTION: &str = "sub1";

/// In-memory ARM: objects are keyed by their URL path
#[derive(Clone, Default)]
struct FakeArm {
    objects: Arc<Mutex<HashMap<String, Value>>>,
}

impl FakeArm {
    fn get(&self, id: &str) -> Option<Value> {
        self.objects.lock().unwrap().get(id).cloned()
    }

    fn insert(&self, id: &str, value: Value) {
        self.objects.lock().unwrap().insert(id.to_string(), value);
    }

    fn remove(&self, id: &str) {
        self.objects.lock().unwrap().remove(id);
    }
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": {"code": "ResourceNotFound", "message": "The resource was not found."}
    }))
}

impl Respond for FakeArm {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = request.url.path().to_string();
        let mut objects = self.objects.lock().unwrap();

        match request.method.as_str() {
            "GET" => match objects.get(&id) {
                Some(object) => ResponseTemplate::new(200).set_body_json(object),
                None => not_found(),
            },
            "PUT" => {
                let mut object: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
                let name = id.rsplit('/').next().unwrap_or_default().to_string();
                object["id"] = json!(id);
                object["name"] = json!(name);
                object["properties"]["provisioningState"] = json!("Succeeded");

                if let Some((_, zone)) = id.split_once("/dnszones/") {
                    let zone = zone.split('/').next().unwrap_or_default();
                    object["properties"]["fqdn"] = json!(format!("{}.{}.", name, zone));
                    object["etag"] = json!(uuid::Uuid::new_v4().to_string());
                }

                let status = if objects.contains_key(&id) { 200 } else { 201 };
                objects.insert(id, object.clone());
                ResponseTemplate::new(status).set_body_json(object)
            }
            "DELETE" => match objects.remove(&id) {
                Some(_) if id.contains("/networkSecurityGroups/") => ResponseTemplate::new(202),
                Some(_) => ResponseTemplate::new(200),
                None => ResponseTemplate::new(204),
            },
            _ => ResponseTemplate::new(405),
        }
    }
}

struct Harness {
    server: MockServer,
    arm: FakeArm,
    provider: Provider,
    stop: StopContext,
}

impl Harness {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let arm = FakeArm::default();

        Mock::given(path_regex("^/subscriptions/[^/]+/resourceGroups/"))
            .respond_with(arm.clone())
            .mount(&server)
            .await;

        let config = ProviderConfig {
            subscription_id: Some(SUBSCRIPTION.into()),
            arm_endpoint: Some(server.uri()),
            ..Default::default()
        };
        let mut client =
            ArmClient::with_credentials(&config, ArmCredentials::static_token("test-token")).unwrap();
        client.poll_interval = Duration::from_millis(10);

        Self {
            server,
            arm,
            provider: Provider::new(client),
            stop: StopContext::new(),
        }
    }

    async fn apply(&self, config: &str, prior: Option<&ResourceData>) -> Result<ResourceData, ProviderError> {
        self.provider.apply(&block(config), prior, &self.stop).await
    }

    async fn methods(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.method.to_string())
            .collect()
    }
}

fn block(config: &str) -> ConfigBlock {
    parse_blocks(config).unwrap().remove(0)
}

fn nsg_id(resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/networkSecurityGroups/{}",
        SUBSCRIPTION, resource_group, name
    )
}

fn txt_id(resource_group: &str, zone: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnszones/{}/TXT/{}",
        SUBSCRIPTION, resource_group, zone, name
    )
}

fn nsg_config(name: &str, location: &str, environment: &str) -> String {
    format!(
        r#"
type: azurestack_network_security_group
name: test
config:
  name: {name}
  location: {location}
  resource_group_name: acctestRG
  security_rule:
    - name: test123
      priority: 100
      direction: Inbound
      access: allow
      protocol: tcp
      source_port_range: "*"
      destination_port_range: "*"
      source_address_prefix: "*"
      destination_address_prefix: "*"
  tags:
    environment: {environment}
    cost_center: MSFT
"#
    )
}

/// NSG block with one inbound TCP rule per `(name, priority)` pair
fn nsg_rules_config(rules: &[(&str, i64)]) -> String {
    let rules: String = rules
        .iter()
        .map(|(name, priority)| {
            format!(
                r#"    - name: {name}
      priority: {priority}
      direction: Inbound
      access: Allow
      protocol: Tcp
      source_port_range: "*"
      destination_port_range: "*"
      source_address_prefix: "*"
      destination_address_prefix: "*"
"#
            )
        })
        .collect();
    let rules = if rules.is_empty() { " []\n".to_string() } else { format!("\n{}", rules) };
    format!(
        r#"
type: azurestack_network_security_group
name: test
config:
  name: acctestnsg
  location: local
  resource_group_name: acctestRG
  security_rule:{rules}"#
    )
}

fn txt_config(name: &str, values: &[String], ttl: i64) -> String {
    let records: String = values
        .iter()
        .map(|v| format!("    - value: \"{}\"\n", v))
        .collect();
    format!(
        r#"
type: azurestack_dns_txt_record
name: test
config:
  name: {name}
  resource_group_name: acctestRG
  zone_name: acctestzone.com
  ttl: {ttl}
  record:
{records}"#
    )
}

mod network_security_group {
    use super::*;

    #[tokio::test]
    async fn test_basic_lifecycle() {
        let h = Harness::start().await;

        let data = h.apply(&nsg_config("acctestnsg", "West US", "Production"), None).await.unwrap();
        let id = nsg_id("acctestRG", "acctestnsg");

        assert_eq!(data.id(), id);
        assert_eq!(data.get_str("location"), "westus");
        assert_eq!(data.get_list("security_rule").len(), 1);
        let rule = &data.get_list("security_rule")[0];
        assert_eq!(rule["access"], "Allow");
        assert_eq!(rule["protocol"], "Tcp");
        assert_eq!(data.get_string_map("tags")["environment"], "Production");

        let remote = h.arm.get(&id).unwrap();
        assert_eq!(remote["location"], "westus");
        assert_eq!(remote["properties"]["securityRules"][0]["properties"]["priority"], 100);

        h.provider.destroy(&data, &h.stop).await.unwrap();
        assert!(h.arm.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_update_tags_in_place() {
        let h = Harness::start().await;
        let created = h.apply(&nsg_config("acctestnsg", "local", "Production"), None).await.unwrap();

        let updated = h
            .apply(&nsg_config("acctestnsg", "local", "staging"), Some(&created))
            .await
            .unwrap();

        assert_eq!(updated.id(), created.id());
        assert_eq!(updated.get_string_map("tags")["environment"], "staging");
        assert_eq!(h.arm.get(created.id()).unwrap()["tags"]["environment"], "staging");
        assert!(!h.methods().await.iter().any(|m| m == "DELETE"));
    }

    #[tokio::test]
    async fn test_location_spelling_does_not_force_replacement() {
        let h = Harness::start().await;
        let created = h.apply(&nsg_config("acctestnsg", "westus", "Production"), None).await.unwrap();

        h.apply(&nsg_config("acctestnsg", "West US", "Production"), Some(&created))
            .await
            .unwrap();

        assert!(!h.methods().await.iter().any(|m| m == "DELETE"));
    }

    #[tokio::test]
    async fn test_rename_replaces_the_group() {
        let h = Harness::start().await;
        let created = h.apply(&nsg_config("first", "local", "Production"), None).await.unwrap();

        let replaced = h.apply(&nsg_config("second", "local", "Production"), Some(&created)).await.unwrap();

        assert_eq!(replaced.id(), nsg_id("acctestRG", "second"));
        assert!(h.arm.get(&nsg_id("acctestRG", "first")).is_none());
        assert!(h.arm.get(&nsg_id("acctestRG", "second")).is_some());
    }

    #[tokio::test]
    async fn test_requires_import() {
        let h = Harness::start().await;
        h.apply(&nsg_config("acctestnsg", "local", "Production"), None).await.unwrap();

        let err = h.apply(&nsg_config("acctestnsg", "local", "Production"), None).await.unwrap_err();

        assert!(matches!(err, ProviderError::RequiresImport { .. }));
    }

    #[tokio::test]
    async fn test_disappears() {
        let h = Harness::start().await;
        let data = h.apply(&nsg_config("acctestnsg", "local", "Production"), None).await.unwrap();

        h.arm.remove(data.id());
        let refreshed = h.provider.refresh(&data, &h.stop).await.unwrap();

        assert!(refreshed.is_gone());
    }

    #[tokio::test]
    async fn test_import() {
        let h = Harness::start().await;
        let created = h.apply(&nsg_config("acctestnsg", "local", "Production"), None).await.unwrap();

        let imported = h
            .provider
            .import("azurestack_network_security_group", created.id(), &h.stop)
            .await
            .unwrap();

        assert_eq!(imported.attributes, created.attributes);

        let err = h
            .provider
            .import("azurestack_network_security_group", &nsg_id("acctestRG", "missing"), &h.stop)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = h
            .provider
            .import("azurestack_network_security_group", "/subscriptions/sub1", &h.stop)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn test_rules_are_kept_when_omitted() {
        let h = Harness::start().await;
        let created = h.apply(&nsg_config("acctestnsg", "local", "Production"), None).await.unwrap();

        let without_rules = r#"
type: azurestack_network_security_group
name: test
config:
  name: acctestnsg
  location: local
  resource_group_name: acctestRG
"#;
        let updated = h.apply(without_rules, Some(&created)).await.unwrap();

        assert_eq!(updated.get_list("security_rule").len(), 1);
        assert!(updated.get_string_map("tags").is_empty());
    }

    #[tokio::test]
    async fn test_adding_extra_rules() {
        let h = Harness::start().await;
        let id = nsg_id("acctestRG", "acctestnsg");

        let one = h.apply(&nsg_rules_config(&[("test123", 100)]), None).await.unwrap();
        assert_eq!(one.get_list("security_rule").len(), 1);

        let two = h
            .apply(&nsg_rules_config(&[("test123", 100), ("testDeny", 101)]), Some(&one))
            .await
            .unwrap();

        assert_eq!(two.id(), id);
        let names: Vec<&str> = two
            .get_list("security_rule")
            .iter()
            .filter_map(|r| r["name"].as_str())
            .collect();
        assert_eq!(names, vec!["test123", "testDeny"]);
        assert_eq!(
            h.arm.get(&id).unwrap()["properties"]["securityRules"].as_array().unwrap().len(),
            2
        );
        assert!(!h.methods().await.contains(&"DELETE".to_string()));

        let imported = h
            .provider
            .import("azurestack_network_security_group", &id, &h.stop)
            .await
            .unwrap();
        assert_eq!(imported.get("security_rule"), two.get("security_rule"));
    }

    #[tokio::test]
    async fn test_explicit_empty_rules_clear_them() {
        let h = Harness::start().await;
        let id = nsg_id("acctestRG", "acctestnsg");
        let created = h
            .apply(&nsg_rules_config(&[("test123", 100), ("testDeny", 101)]), None)
            .await
            .unwrap();
        assert_eq!(created.get_list("security_rule").len(), 2);

        let cleared = h.apply(&nsg_rules_config(&[]), Some(&created)).await.unwrap();

        assert_eq!(cleared.id(), id);
        assert!(cleared.get_list("security_rule").is_empty());
        let remote = h.arm.get(&id).unwrap();
        assert!(remote["properties"]["securityRules"]
            .as_array()
            .map_or(true, Vec::is_empty));
    }

    #[tokio::test]
    async fn test_invalid_rule_is_rejected_before_any_request() {
        let h = Harness::start().await;
        let config = nsg_config("acctestnsg", "local", "Production").replace("priority: 100", "priority: 99");

        let err = h.apply(&config, None).await.unwrap_err();

        let ProviderError::Validation(errors) = err else {
            panic!("expected a validation error");
        };
        assert_eq!(
            errors,
            vec!["security_rule.0.priority: expected to be in the range (100 - 4096), got 99".to_string()]
        );
        assert!(h.methods().await.is_empty());
    }
}

mod dns_txt_record {
    use super::*;

    #[tokio::test]
    async fn test_basic_lifecycle() {
        let h = Harness::start().await;
        let long = "a".repeat(300);
        let values = vec!["Quick brown fox".to_string(), long.clone()];

        let data = h.apply(&txt_config("myarecord", &values, 300), None).await.unwrap();
        let id = txt_id("acctestRG", "acctestzone.com", "myarecord");

        assert_eq!(data.id(), id);
        assert_eq!(data.get_str("fqdn"), "myarecord.acctestzone.com.");
        assert_eq!(data.get_i64("ttl", 0), 300);
        let records: Vec<&str> = data
            .get_list("record")
            .iter()
            .filter_map(|r| r["value"].as_str())
            .collect();
        assert_eq!(records, vec!["Quick brown fox", long.as_str()]);

        let remote = h.arm.get(&id).unwrap();
        assert_eq!(remote["properties"]["TTL"], 300);
        assert_eq!(remote["properties"]["TXTRecords"][1]["value"].as_array().unwrap().len(), 2);

        h.provider.destroy(&data, &h.stop).await.unwrap();
        assert!(h.arm.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_update_records_and_ttl() {
        let h = Harness::start().await;
        let created = h
            .apply(&txt_config("myarecord", &["one".to_string()], 300), None)
            .await
            .unwrap();

        let updated = h
            .apply(
                &txt_config("myarecord", &["one".to_string(), "two".to_string()], 3600),
                Some(&created),
            )
            .await
            .unwrap();

        assert_eq!(updated.get_i64("ttl", 0), 3600);
        assert_eq!(updated.get_list("record").len(), 2);
        assert_eq!(updated.get_str("fqdn"), "myarecord.acctestzone.com.");
    }

    #[tokio::test]
    async fn test_tags_are_stored_as_metadata() {
        let h = Harness::start().await;
        let config = format!(
            "{}  tags:\n    environment: Production\n",
            txt_config("myarecord", &["one".to_string()], 300)
        );

        let data = h.apply(&config, None).await.unwrap();

        assert_eq!(h.arm.get(data.id()).unwrap()["properties"]["metadata"]["environment"], "Production");
        assert_eq!(data.get_string_map("tags")["environment"], "Production");
    }

    #[tokio::test]
    async fn test_disappears() {
        let h = Harness::start().await;
        let data = h
            .apply(&txt_config("myarecord", &["one".to_string()], 300), None)
            .await
            .unwrap();

        h.arm.remove(data.id());

        assert!(h.provider.refresh(&data, &h.stop).await.unwrap().is_gone());
        h.provider.destroy(&data, &h.stop).await.unwrap();
    }

    #[tokio::test]
    async fn test_requires_import() {
        let h = Harness::start().await;
        h.arm.insert(
            &txt_id("acctestRG", "acctestzone.com", "myarecord"),
            json!({"properties": {"TTL": 60}}),
        );

        let err = h
            .apply(&txt_config("myarecord", &["one".to_string()], 300), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RequiresImport { .. }));
    }

    #[tokio::test]
    async fn test_empty_record_set_is_invalid() {
        let h = Harness::start().await;

        let err = h.apply(&txt_config("myarecord", &[], 300), None).await.unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
    }
}

mod resources_data_source {
    use super::*;
    use wiremock::matchers::{method, path, query_param};

    #[tokio::test]
    async fn test_query_by_type_and_tag() {
        let h = Harness::start().await;

        Mock::given(method("GET"))
            .and(path("/subscriptions/sub1/resources"))
            .and(query_param("$filter", "resourceType eq 'Microsoft.Network/networkSecurityGroups'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {
                        "id": nsg_id("rg", "prod"),
                        "name": "prod",
                        "type": "Microsoft.Network/networkSecurityGroups",
                        "location": "local",
                        "tags": {"environment": "Production"}
                    },
                    {
                        "id": nsg_id("rg", "dev"),
                        "name": "dev",
                        "type": "Microsoft.Network/networkSecurityGroups",
                        "location": "local",
                        "tags": {"environment": "Development"}
                    }
                ]
            })))
            .mount(&h.server)
            .await;

        let query = block(
            r#"
type: azurestack_resources
name: test
config:
  type: Microsoft.Network/networkSecurityGroups
  required_tags:
    environment: Production
"#,
        );

        let first = h.provider.read_data_source(&query, &h.stop).await.unwrap();
        let second = h.provider.read_data_source(&query, &h.stop).await.unwrap();

        assert!(first.id().starts_with("resource-"));
        assert_ne!(first.id(), second.id());
        assert_eq!(first.get("resources"), second.get("resources"));
        assert_eq!(
            first.get("resources").unwrap(),
            &json!([{
                "id": nsg_id("rg", "prod"),
                "name": "prod",
                "type": "Microsoft.Network/networkSecurityGroups",
                "location": "local",
                "tags": {"environment": "Production"}
            }])
        );
    }

    #[tokio::test]
    async fn test_query_without_scalar_filter_fails() {
        let h = Harness::start().await;
        let query = block(
            r#"
type: azurestack_resources
name: test
config:
  required_tags:
    environment: Production
"#,
        );

        let err = h.provider.read_data_source(&query, &h.stop).await.unwrap_err();

        assert!(matches!(err, ProviderError::InvalidArgument(_)));
        assert!(h.methods().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_query_fails() {
        let h = Harness::start().await;
        h.stop.cancel();

        let err = h
            .provider
            .read_data_source(
                &block("type: azurestack_resources\nname: test\nconfig:\n  name: web\n"),
                &h.stop,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Cancelled));
        assert!(h.methods().await.is_empty());
    }
}
