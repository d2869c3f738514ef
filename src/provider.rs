//! Provider
//!
//! Drives the resource and data source handlers for configuration blocks:
//! validation, create-vs-update planning, replacement on force-new changes,
//! and the timeout envelope around every operation.

use crate::arm::client::ArmClient;
use crate::arm::error::{ProviderError, ProviderResult};
use crate::resource::{self, DataSource, Resource};
use crate::schema::{self, Block};
use crate::state::{ConfigBlock, ResourceData};
use crate::timeouts::{with_timeout, StopContext};
use serde_json::{Map, Value};

pub struct Provider {
    client: ArmClient,
}

impl Provider {
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }

    fn resource(type_name: &str) -> ProviderResult<(&'static dyn Resource, &'static Block)> {
        match (resource::get_resource(type_name), schema::get_resource_schema(type_name)) {
            (Some(handler), Some(schema)) => Ok((handler, schema)),
            _ => Err(ProviderError::InvalidArgument(format!(
                "unsupported resource type {:?}",
                type_name
            ))),
        }
    }

    fn data_source(type_name: &str) -> ProviderResult<(&'static dyn DataSource, &'static Block)> {
        match (
            resource::get_data_source(type_name),
            schema::get_data_source_schema(type_name),
        ) {
            (Some(handler), Some(schema)) => Ok((handler, schema)),
            _ => Err(ProviderError::InvalidArgument(format!(
                "unsupported data source type {:?}",
                type_name
            ))),
        }
    }

    /// Check a block against its schema without touching ARM
    pub fn validate(block: &ConfigBlock) -> ProviderResult<()> {
        let schema = match schema::get_resource_schema(&block.type_name) {
            Some(schema) => schema,
            None => Self::data_source(&block.type_name)?.1,
        };
        schema::validate_config(schema, &block.config)
    }

    /// Converge the remote object to `block`.
    ///
    /// Creates when there is no prior state, updates in place otherwise, and
    /// replaces (delete then create) when a force-new attribute changed.
    pub async fn apply(
        &self,
        block: &ConfigBlock,
        prior: Option<&ResourceData>,
        stop: &StopContext,
    ) -> ProviderResult<ResourceData> {
        let (handler, schema) = Self::resource(&block.type_name)?;
        schema::validate_config(schema, &block.config)?;
        let timeouts = self.client.timeouts;

        let Some(prior) = prior.filter(|p| !p.is_gone()) else {
            return self.create(handler, block, stop).await;
        };

        let planned = plan_attributes(schema, &prior.attributes, &block.config);
        let replacements = schema::force_new_changes(schema, &prior.attributes, &planned);

        if !replacements.is_empty() {
            tracing::info!(
                "{} must be replaced: {} changed",
                block.address(),
                replacements.join(", ")
            );
            let mut old = prior.clone();
            with_timeout(timeouts.delete, handler.delete(&self.client, &mut old, stop)).await?;
            return self.create(handler, block, stop).await;
        }

        tracing::info!("Updating {}", block.address());
        let mut data = ResourceData::new(&block.type_name, planned);
        data.set_id(prior.id());
        with_timeout(timeouts.update, handler.update(&self.client, &mut data, stop)).await?;
        Ok(data)
    }

    async fn create(
        &self,
        handler: &dyn Resource,
        block: &ConfigBlock,
        stop: &StopContext,
    ) -> ProviderResult<ResourceData> {
        tracing::info!("Creating {}", block.address());
        let mut data = ResourceData::for_create(&block.type_name, block.config.clone());
        with_timeout(
            self.client.timeouts.create,
            handler.create(&self.client, &mut data, stop),
        )
        .await?;
        Ok(data)
    }

    /// Re-read a managed object; the returned data has an empty ID when it is gone
    pub async fn refresh(&self, data: &ResourceData, stop: &StopContext) -> ProviderResult<ResourceData> {
        let (handler, _) = Self::resource(&data.type_name)?;
        let mut refreshed = data.clone();
        with_timeout(
            self.client.timeouts.read,
            handler.read(&self.client, &mut refreshed, stop),
        )
        .await?;
        Ok(refreshed)
    }

    pub async fn destroy(&self, data: &ResourceData, stop: &StopContext) -> ProviderResult<()> {
        let (handler, _) = Self::resource(&data.type_name)?;
        tracing::info!("Destroying {} {}", data.type_name, data.id());
        let mut data = data.clone();
        with_timeout(
            self.client.timeouts.delete,
            handler.delete(&self.client, &mut data, stop),
        )
        .await
    }

    /// Adopt an existing object by ID
    pub async fn import(&self, type_name: &str, id: &str, stop: &StopContext) -> ProviderResult<ResourceData> {
        let (handler, _) = Self::resource(type_name)?;
        handler.validate_id(id)?;

        let mut data = ResourceData::from_id(type_name, id);
        with_timeout(
            self.client.timeouts.read,
            handler.read(&self.client, &mut data, stop),
        )
        .await?;

        if data.is_gone() {
            return Err(ProviderError::NotFound(id.to_string()));
        }
        Ok(data)
    }

    /// Evaluate a data source block
    pub async fn read_data_source(&self, block: &ConfigBlock, stop: &StopContext) -> ProviderResult<ResourceData> {
        let (handler, schema) = Self::data_source(&block.type_name)?;
        schema::validate_config(schema, &block.config)?;

        let mut data = ResourceData::new(&block.type_name, block.config.clone());
        with_timeout(
            self.client.timeouts.read,
            handler.read(&self.client, &mut data, stop),
        )
        .await?;
        Ok(data)
    }
}

/// Planned attributes: configuration, with prior values kept for computed
/// attributes the configuration leaves unset
pub fn plan_attributes(
    schema: &Block,
    prior: &Map<String, Value>,
    config: &Map<String, Value>,
) -> Map<String, Value> {
    let mut planned = config.clone();

    for (name, attr) in &schema.attributes {
        let unset = planned.get(name).map_or(true, Value::is_null);
        if attr.computed && unset {
            if let Some(value) = prior.get(name) {
                planned.insert(name.clone(), value.clone());
            }
        }
    }

    planned
}
