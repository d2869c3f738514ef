//! ARM Client
//!
//! Main client for interacting with Azure Stack Resource Manager, combining
//! authentication, HTTP, and the provider-wide settings every handler needs.

use super::auth::ArmCredentials;
use super::error::{ProviderError, ProviderResult};
use super::http::{ArmHttpClient, ArmResponse};
use crate::config::{ApiVersions, ProviderConfig};
use crate::timeouts::{StopContext, Timeouts};
use serde_json::Value;
use std::time::Duration;

/// Default interval between provisioning-state polls
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: ArmCredentials,
    pub http: ArmHttpClient,
    pub subscription_id: String,
    pub endpoint: String,
    pub api_versions: ApiVersions,
    pub timeouts: Timeouts,
    pub poll_interval: Duration,
}

impl ArmClient {
    /// Create a new ARM client from provider configuration
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        let credentials = ArmCredentials::from_config(config)?;
        Self::with_credentials(config, credentials)
    }

    /// Create a client with explicitly supplied credentials
    pub fn with_credentials(
        config: &ProviderConfig,
        credentials: ArmCredentials,
    ) -> ProviderResult<Self> {
        let subscription_id = config.subscription()?.to_string();

        Ok(Self {
            credentials,
            http: ArmHttpClient::new()?,
            subscription_id,
            endpoint: config.effective_endpoint(),
            api_versions: config.api_versions.clone(),
            timeouts: Timeouts::from_config(&config.timeouts),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Get the current access token
    pub async fn get_token(&self) -> ProviderResult<String> {
        self.credentials.get_token().await
    }

    /// Make a GET request to an ARM API; a rejected token is refreshed once
    pub async fn get(&self, url: &str) -> ProviderResult<Value> {
        let token = self.get_token().await?;
        match self.http.get(url, &token).await {
            Err(err) if err.status() == Some(401) => {
                tracing::debug!("Token rejected, refreshing");
                let token = self.credentials.refresh_token().await?;
                self.http.get(url, &token).await
            }
            other => other,
        }
    }

    /// Make a PUT request to an ARM API
    pub async fn put(&self, url: &str, body: &Value) -> ProviderResult<ArmResponse> {
        let token = self.get_token().await?;
        self.http.put(url, &token, body).await
    }

    /// Make a DELETE request to an ARM API
    pub async fn delete(&self, url: &str) -> ProviderResult<ArmResponse> {
        let token = self.get_token().await?;
        self.http.delete(url, &token).await
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build an ARM URL for `path` (which starts with '/') at `api_version`
    pub fn arm_url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, path, api_version)
    }

    /// Build a subscription-scoped path
    pub fn subscription_path(&self, suffix: &str) -> String {
        format!("/subscriptions/{}{}", self.subscription_id, suffix)
    }

    /// Build the URL of an object from its full resource ID
    pub fn resource_id_url(&self, id: &str, api_version: &str) -> String {
        let path = id
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        self.arm_url(&path, api_version)
    }

    // =========================================================================
    // Long-running operations
    // =========================================================================

    /// Poll `url` until `properties.provisioningState` reaches a terminal state
    pub async fn wait_for_provisioning(&self, url: &str, stop: &StopContext) -> ProviderResult<Value> {
        loop {
            stop.check()?;
            let body = self.get(url).await?;

            match provisioning_state(&body) {
                None | Some("Succeeded") => return Ok(body),
                Some(state @ ("Failed" | "Canceled")) => {
                    return Err(ProviderError::request(format!(
                        "provisioning finished in state {:?}",
                        state
                    )))
                }
                Some(state) => {
                    tracing::debug!("{} is {}, polling again", url, state);
                    stop.sleep(self.poll_interval).await?;
                }
            }
        }
    }

    /// Poll `url` until the object is gone
    pub async fn wait_for_deletion(&self, url: &str, stop: &StopContext) -> ProviderResult<()> {
        loop {
            stop.check()?;
            match self.get(url).await {
                Err(err) if err.is_not_found() => return Ok(()),
                Err(err) => return Err(err),
                Ok(_) => {
                    tracing::debug!("{} still exists, polling again", url);
                    stop.sleep(self.poll_interval).await?;
                }
            }
        }
    }
}

/// `properties.provisioningState` of an ARM object, if reported
pub fn provisioning_state(body: &Value) -> Option<&str> {
    body.get("properties")
        .and_then(|p| p.get("provisioningState"))
        .and_then(|v| v.as_str())
}

/// Normalize a location the way ARM reports it ("West US" -> "westus")
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}
