//! azstack - declarative Azure Stack resource management
//!
//! Network security groups and DNS TXT records are managed through
//! [`provider::Provider`]; the `azurestack_resources` data source queries the
//! subscription inventory with a client-side tag filter.

pub mod arm;
pub mod config;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod state;
pub mod tags;
pub mod timeouts;

/// Version injected at compile time via AZSTACK_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AZSTACK_VERSION") {
    Some(v) => v,
    None => "dev",
};
