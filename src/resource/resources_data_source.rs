//! Resources data source
//!
//! Lists every resource visible to the subscription that matches a structural
//! filter (resource group, name, type), following continuation links, then
//! keeps only the records carrying all required tags. ARM cannot combine a
//! tag predicate with other predicates, so tags are matched client-side.

use super::DataSource;
use crate::arm::client::ArmClient;
use crate::arm::error::{ProviderError, ProviderResult};
use crate::arm::types::{ArmList, GenericResource, Tags};
use crate::state::ResourceData;
use crate::tags;
use crate::timeouts::StopContext;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

pub const TYPE_NAME: &str = "azurestack_resources";

/// Structural and tag predicates of one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub resource_group: Option<String>,
    pub name: Option<String>,
    pub resource_type: Option<String>,
    pub required_tags: BTreeMap<String, String>,
}

impl FilterCriteria {
    /// Read criteria from the data source attributes
    pub fn from_data(data: &ResourceData) -> Self {
        Self {
            resource_group: data.get_optional_str("resource_group_name").map(str::to_string),
            name: data.get_optional_str("name").map(str::to_string),
            resource_type: data.get_optional_str("type").map(str::to_string),
            required_tags: tags::expand(data.get("required_tags"))
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
        }
    }
}

/// Flattened record handed back as computed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub location: String,
    pub tags: BTreeMap<String, String>,
}

/// Flatten one listing record; `None` for records without an ID
pub fn flatten_record(record: &GenericResource) -> Option<ResourceSummary> {
    let id = record.id.clone()?;
    Some(ResourceSummary {
        id,
        name: record.name.clone().unwrap_or_default(),
        resource_type: record.resource_type.clone().unwrap_or_default(),
        location: record.location.clone().unwrap_or_default(),
        tags: record
            .tags
            .iter()
            .flatten()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect(),
    })
}

/// Outcome of a successful query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    /// Synthetic state key, unrelated to the records
    pub id: String,
    pub resources: Vec<ResourceSummary>,
}

/// Receives a note for every record dropped by the tag filter
pub trait DiagnosticSink {
    fn record_skipped(&mut self, name: &str, id: &str);
}

/// Writes skipped records to the debug log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record_skipped(&mut self, name: &str, id: &str) {
        tracing::debug!(
            "{} - resource {:?} (id: {:?}) skipped as a required tag is not set or has the wrong value",
            TYPE_NAME,
            name,
            id
        );
    }
}

/// Source of resource listing pages
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// First page of resources matching an OData filter expression
    async fn list_resources(&self, filter: &str) -> ProviderResult<ArmList<GenericResource>>;

    /// Page behind a continuation link
    async fn list_resources_next(&self, next_link: &str) -> ProviderResult<ArmList<GenericResource>>;
}

#[async_trait]
impl ResourceLister for ArmClient {
    async fn list_resources(&self, filter: &str) -> ProviderResult<ArmList<GenericResource>> {
        let base = format!(
            "{}{}",
            self.endpoint,
            self.subscription_path("/resources")
        );
        let url = url::Url::parse_with_params(
            &base,
            &[
                ("$filter", filter),
                ("api-version", self.api_versions.resources.as_str()),
            ],
        )
        .map_err(|e| ProviderError::InvalidArgument(format!("building listing URL: {}", e)))?;

        let body = self.get(url.as_str()).await?;
        serde_json::from_value(body).map_err(|e| ProviderError::decode("resource listing page", e))
    }

    async fn list_resources_next(&self, next_link: &str) -> ProviderResult<ArmList<GenericResource>> {
        let body = self.get(next_link).await?;
        serde_json::from_value(body).map_err(|e| ProviderError::decode("resource listing page", e))
    }
}

/// Quote a literal for an OData expression
fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Server-side filter: non-empty predicates joined with " and "
///
/// Fails with `InvalidArgument` when none of the scalar predicates is set.
pub fn build_filter(criteria: &FilterCriteria) -> ProviderResult<String> {
    let predicates: Vec<String> = [
        ("resourceGroup", criteria.resource_group.as_deref()),
        ("name", criteria.name.as_deref()),
        ("resourceType", criteria.resource_type.as_deref()),
    ]
    .into_iter()
    .filter_map(|(field, value)| {
        value
            .filter(|v| !v.is_empty())
            .map(|v| format!("{} eq {}", field, odata_literal(v)))
    })
    .collect();

    if predicates.is_empty() {
        return Err(ProviderError::InvalidArgument(
            "At least one of `name`, `resource_group_name` or `type` must be specified".to_string(),
        ));
    }

    Ok(predicates.join(" and "))
}

/// True iff every required tag is present with exactly the required value
pub fn tags_match(tags: Option<&Tags>, required: &BTreeMap<String, String>) -> bool {
    let matches = tags
        .map(|tags| {
            required
                .iter()
                .filter(|(key, value)| {
                    tags.get(*key)
                        .and_then(|v| v.as_deref())
                        .is_some_and(|v| v == value.as_str())
                })
                .count()
        })
        .unwrap_or(0);

    matches == required.len()
}

/// Flatten the records of one page that pass the tag filter, in order
///
/// Records without an ID are dropped silently.
pub fn filter_records(
    records: &[GenericResource],
    required: &BTreeMap<String, String>,
    sink: &mut dyn DiagnosticSink,
) -> Vec<ResourceSummary> {
    let mut kept = Vec::new();

    for record in records {
        let Some(summary) = flatten_record(record) else {
            continue;
        };

        if tags_match(record.tags.as_ref(), required) {
            kept.push(summary);
        } else {
            sink.record_skipped(&summary.name, &summary.id);
        }
    }

    kept
}

/// List every resource matching `criteria`, following continuation links
///
/// Any failed page aborts the whole listing; partial results are never
/// returned. The stop signal is checked before each page fetch.
pub async fn list_filtered<L>(
    lister: &L,
    criteria: &FilterCriteria,
    sink: &mut (dyn DiagnosticSink + Send),
    stop: &StopContext,
) -> ProviderResult<ResultSet>
where
    L: ResourceLister + ?Sized,
{
    let filter = build_filter(criteria)?;
    tracing::debug!("{} filter: {}", TYPE_NAME, filter);

    stop.check()?;
    let mut page = lister
        .list_resources(&filter)
        .await
        .map_err(|e| e.into_request_failed("getting resources"))?;

    let mut resources = filter_records(&page.value, &criteria.required_tags, sink);

    while let Some(next_link) = page.next().map(str::to_string) {
        stop.check()?;
        page = lister
            .list_resources_next(&next_link)
            .await
            .map_err(|e| e.into_request_failed("loading Resource List"))?;
        resources.extend(filter_records(&page.value, &criteria.required_tags, sink));
    }

    tracing::debug!("{} matched {} resources", TYPE_NAME, resources.len());

    Ok(ResultSet {
        id: format!("resource-{}", uuid::Uuid::new_v4()),
        resources,
    })
}

/// `azurestack_resources`
pub struct ResourcesDataSource;

#[async_trait]
impl DataSource for ResourcesDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn read(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()> {
        let criteria = FilterCriteria::from_data(data);
        let mut sink = TracingSink;
        let result = list_filtered(client, &criteria, &mut sink, stop).await?;

        data.set_id(result.id);
        let resources =
            serde_json::to_value(&result.resources).map_err(|e| ProviderError::decode("resources", e))?;
        data.set("resources", resources);
        Ok(())
    }
}
