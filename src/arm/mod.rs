//! Azure Resource Manager interaction module
//!
//! This module provides the core functionality for talking to an Azure Stack
//! Resource Manager endpoint: authentication, HTTP, resource IDs and the typed
//! request/response bodies.
//!
//! # Module Structure
//!
//! - [`auth`] - Service-principal authentication with token caching
//! - [`client`] - Main ARM client passed explicitly to every handler
//! - [`error`] - Typed provider errors
//! - [`http`] - HTTP utilities for REST API calls
//! - [`id`] - Resource ID formatting and parsing
//! - [`types`] - Typed ARM bodies
//!
//! # Example
//!
//! ```ignore
//! use azstack::arm::client::ArmClient;
//! use azstack::config::ProviderConfig;
//!
//! async fn example() -> azstack::arm::error::ProviderResult<()> {
//!     let client = ArmClient::new(&ProviderConfig::load())?;
//!     let url = client.arm_url(&client.subscription_path("/resourceGroups"), "2019-10-01");
//!     let groups = client.get(&url).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod id;
pub mod types;
