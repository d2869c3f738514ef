//! Resource abstraction layer
//!
//! Each managed object type implements [`Resource`]; read-only queries
//! implement [`DataSource`]. Handlers receive the [`ArmClient`] explicitly and
//! translate between [`ResourceData`] and the typed ARM bodies.
//!
//! # Architecture
//!
//! - [`network_security_group`] - `azurestack_network_security_group`
//! - [`dns_txt_record`] - `azurestack_dns_txt_record`
//! - [`resources_data_source`] - `azurestack_resources`, paged listing with tag filtering
//!
//! Schemas for every type live in `src/schemas/` (see [`crate::schema`]).

pub mod dns_txt_record;
pub mod network_security_group;
pub mod resources_data_source;

use crate::arm::client::ArmClient;
use crate::arm::error::ProviderResult;
use crate::state::ResourceData;
use crate::timeouts::StopContext;
use async_trait::async_trait;

pub use dns_txt_record::DnsTxtRecordResource;
pub use network_security_group::NetworkSecurityGroupResource;
pub use resources_data_source::{
    build_filter, filter_records, flatten_record, list_filtered, tags_match, DiagnosticSink, FilterCriteria,
    ResourceLister, ResourceSummary, ResourcesDataSource, ResultSet, TracingSink,
};

/// CRUD handlers for one managed object type
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &'static str;

    /// Check that `id` is a well-formed ID of this type (import)
    fn validate_id(&self, id: &str) -> ProviderResult<()>;

    /// Create the object; fails if it already exists
    async fn create(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()>;

    /// Refresh `data` from the remote object; clears the ID when it is gone
    async fn read(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()>;

    /// Update the object in place
    async fn update(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()>;

    /// Delete the object
    async fn delete(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()>;
}

/// Read-only query type
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    async fn read(&self, client: &ArmClient, data: &mut ResourceData, stop: &StopContext) -> ProviderResult<()>;
}

/// Get the handler for a resource type
pub fn get_resource(type_name: &str) -> Option<&'static dyn Resource> {
    match type_name {
        network_security_group::TYPE_NAME => Some(&NetworkSecurityGroupResource),
        dns_txt_record::TYPE_NAME => Some(&DnsTxtRecordResource),
        _ => None,
    }
}

/// Get the handler for a data source type
pub fn get_data_source(type_name: &str) -> Option<&'static dyn DataSource> {
    match type_name {
        resources_data_source::TYPE_NAME => Some(&ResourcesDataSource),
        _ => None,
    }
}
