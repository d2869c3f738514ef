//! Configuration Management
//!
//! Provider settings are resolved from CLI flags, `ARM_*` environment
//! variables and a persistent config file, in that order of precedence.

use crate::arm::error::{ProviderError, ProviderResult};
use crate::timeouts::TimeoutConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// ARM endpoint of a default Azure Stack Development Kit install
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.local.azurestack.external";

/// Azure AD authority used for client-credentials token requests
pub const DEFAULT_AUTHENTICATION_ENDPOINT: &str = "https://login.microsoftonline.com";

/// Token audience when none is configured
pub const DEFAULT_TOKEN_AUDIENCE: &str = "https://management.core.windows.net/";

/// API versions of the 2020-09-01 Azure Stack profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiVersions {
    #[serde(default = "default_resources_api")]
    pub resources: String,
    #[serde(default = "default_network_api")]
    pub network: String,
    #[serde(default = "default_dns_api")]
    pub dns: String,
}

fn default_resources_api() -> String {
    "2019-10-01".to_string()
}

fn default_network_api() -> String {
    "2018-11-01".to_string()
}

fn default_dns_api() -> String {
    "2016-04-01".to_string()
}

impl Default for ApiVersions {
    fn default() -> Self {
        Self {
            resources: default_resources_api(),
            network: default_network_api(),
            dns: default_dns_api(),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Never written back to disk
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    /// Pre-acquired bearer token; skips the client-credentials flow
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub arm_endpoint: Option<String>,
    #[serde(default)]
    pub authentication_endpoint: Option<String>,
    #[serde(default)]
    pub token_audience: Option<String>,
    #[serde(default)]
    pub api_versions: ApiVersions,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl ProviderConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azstack").join("config.json"))
    }

    /// Load configuration from disk, then overlay the environment
    pub fn load() -> Self {
        let mut config = Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        config.apply_env();
        config
    }

    /// Load configuration from a specific file; missing or invalid files yield defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config file {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk (secrets are skipped)
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Overlay `ARM_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Overlay variables from an arbitrary lookup; empty values are ignored
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ARM_SUBSCRIPTION_ID") {
            self.subscription_id = Some(v);
        }
        if let Some(v) = get("ARM_TENANT_ID") {
            self.tenant_id = Some(v);
        }
        if let Some(v) = get("ARM_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = get("ARM_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = get("ARM_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = get("ARM_ENDPOINT") {
            self.arm_endpoint = Some(v);
        }
        if let Some(v) = get("ARM_AUTHENTICATION_ENDPOINT") {
            self.authentication_endpoint = Some(v);
        }
        if let Some(v) = get("ARM_TOKEN_AUDIENCE") {
            self.token_audience = Some(v);
        }
    }

    /// Get effective ARM endpoint (without trailing slash)
    pub fn effective_endpoint(&self) -> String {
        self.arm_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ARM_ENDPOINT)
            .trim_end_matches('/')
            .to_string()
    }

    /// Get effective authentication endpoint (without trailing slash)
    pub fn effective_authentication_endpoint(&self) -> String {
        self.authentication_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_AUTHENTICATION_ENDPOINT)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn effective_token_audience(&self) -> String {
        self.token_audience
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_AUDIENCE.to_string())
    }

    /// Subscription every request is scoped to
    pub fn subscription(&self) -> ProviderResult<&str> {
        self.subscription_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidArgument(
                    "subscription_id must be configured (or set ARM_SUBSCRIPTION_ID)".to_string(),
                )
            })
    }
}
