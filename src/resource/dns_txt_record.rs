//! azurestack_dns_txt_record
//!
//! TXT values longer than a single DNS character-string are stored as several
//! segments of at most 254 characters and joined back on read.

use super::Resource;
use crate::arm::client::ArmClient;
use crate::arm::error::{ProviderError, ProviderResult};
use crate::arm::id::TxtRecordId;
use crate::arm::types::{RecordSet, RecordSetProperties, TxtRecord};
use crate::state::ResourceData;
use crate::tags;
use crate::timeouts::StopContext;
use async_trait::async_trait;
use serde_json::{json, Value};

pub const TYPE_NAME: &str = "azurestack_dns_txt_record";

/// Maximum length of one TXT segment
const SEGMENT_LENGTH: usize = 254;

pub struct DnsTxtRecordResource;

impl DnsTxtRecordResource {
    fn url(client: &ArmClient, id: &TxtRecordId) -> String {
        client.resource_id_url(&id.id(), &client.api_versions.dns)
    }

    async fn create_or_update(
        &self,
        client: &ArmClient,
        data: &mut ResourceData,
        stop: &StopContext,
    ) -> ProviderResult<()> {
        let name = data.get_str("name").to_string();
        let resource_group = data.get_str("resource_group_name").to_string();
        let zone = data.get_str("zone_name").to_string();
        let id = TxtRecordId::new(&client.subscription_id, &resource_group, &zone, &name);
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
                        "checking for presence of existing DNS TXT record {:?} (Zone {:?} / Resource Group {:?})",
                        name, zone, resource_group
                    )))
                }
            }
        }

        let record_set = RecordSet {
            name: Some(name.clone()),
            properties: Some(RecordSetProperties {
                metadata: Some(tags::expand(data.get("tags"))),
                ttl: Some(data.get_i64("ttl", 0)),
                txt_records: Some(expand_txt_records(data.get_list("record"))),
                ..Default::default()
            }),
            ..Default::default()
        };
        let body = serde_json::to_value(&record_set).map_err(|e| ProviderError::decode("TXT record set", e))?;

        tracing::info!("Creating/updating DNS TXT record {:?} in zone {:?}", name, zone);
        stop.check()?;
        client.put(&url, &body).await.map_err(|e| {
            e.context(&format!(
                "creating/updating DNS TXT record {:?} (Zone {:?} / Resource Group {:?})",
                name, zone, resource_group
            ))
        })?;

        data.set_id(id.id());
        self.read(client, data, stop).await
    }
}

#[async_trait]
impl Resource for DnsTxtRecordResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn validate_id(&self, id: &str) -> ProviderResult<()> {
        TxtRecordId::parse(id).map(|_| ())
    }

    async fn create(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        self.create_or_update(client, data, stop).await
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        let id = TxtRecordId::parse(data.id())?;
        stop.check()?;

        let body = match client.get(&Self::url(client, &id)).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => {
                tracing::info!("DNS TXT record {:?} was not found - removing from state", id.txt_name);
                data.clear_id();
                return Ok(());
            }
            Err(err) => {
                return Err(err.context(&format!(
                    "retrieving DNS TXT record {:?} (Zone {:?} / Resource Group {:?})",
                    id.txt_name, id.dnszone_name, id.resource_group
                )))
            }
        };

        let record_set: RecordSet =
            serde_json::from_value(body).map_err(|e| ProviderError::decode("TXT record set", e))?;
        let props = record_set.properties.unwrap_or_default();

        data.set("name", id.txt_name.clone());
        data.set("resource_group_name", id.resource_group.clone());
        data.set("zone_name", id.dnszone_name.clone());
        data.set("ttl", props.ttl.unwrap_or_default());
        data.set("fqdn", props.fqdn.unwrap_or_default());
        data.set("record", flatten_txt_records(props.txt_records.as_deref().unwrap_or(&[])));
        tags::flatten_and_set(data, props.metadata.as_ref());

        Ok(())
    }

    async fn update(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        self.create_or_update(client, data, stop).await
    }

    async fn delete(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        let id = TxtRecordId::parse(data.id())?;
        stop.check()?;

        tracing::info!("Deleting DNS TXT record {:?} in zone {:?}", id.txt_name, id.dnszone_name);
        let response = match client.delete(&Self::url(client, &id)).await {
            Ok(response) => response,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => {
                return Err(err.context(&format!(
                    "deleting DNS TXT record {:?} (Zone {:?} / Resource Group {:?})",
                    id.txt_name, id.dnszone_name, id.resource_group
                )))
            }
        };

        match response.status {
            200 | 204 => Ok(()),
            status => Err(ProviderError::RequestFailed {
                status: Some(status),
                message: format!(
                    "deleting DNS TXT record {:?} (Zone {:?} / Resource Group {:?}): unexpected status {}",
                    id.txt_name, id.dnszone_name, id.resource_group, status
                ),
            }),
        }
    }
}

/// Split a TXT value into segments of at most 254 characters
fn split_segments(value: &str) -> Vec<String> {
    let chars: Vec<char> = value.chars().collect();
    chars
        .chunks(SEGMENT_LENGTH)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// `record` blocks -> ARM TXT records
pub fn expand_txt_records(blocks: &[Value]) -> Vec<TxtRecord> {
    blocks
        .iter()
        .filter_map(|block| block.get("value").and_then(|v| v.as_str()))
        .map(|value| TxtRecord {
            value: Some(split_segments(value)),
        })
        .collect()
}

/// ARM TXT records -> `record` blocks
pub fn flatten_txt_records(records: &[TxtRecord]) -> Value {
    let blocks = records
        .iter()
        .filter_map(|record| record.value.as_ref())
        .map(|segments| json!({ "value": segments.concat() }))
        .collect();
    Value::Array(blocks)
}
