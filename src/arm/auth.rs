//! ARM Authentication
//!
//! Handles service-principal (client-credentials) authentication against the
//! Azure AD authority, or a pre-acquired bearer token.

use super::error::{ProviderError, ProviderResult};
use super::http::ArmHttpClient;
use crate::config::ProviderConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the authority does not report one
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// A freshly issued access token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Duration,
}

/// Something that can mint access tokens
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> ProviderResult<AccessToken>;
}

/// Client-credentials grant against `{authority}/{tenant}/oauth2/token`
pub struct ClientSecretCredential {
    http: ArmHttpClient,
    token_url: String,
    client_id: String,
    client_secret: String,
    resource: String,
}

impl ClientSecretCredential {
    pub fn new(
        authority: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        resource: &str,
    ) -> ProviderResult<Self> {
        Ok(Self {
            http: ArmHttpClient::new()?,
            token_url: format!("{}/{}/oauth2/token", authority.trim_end_matches('/'), tenant_id),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            resource: resource.to_string(),
        })
    }
}

#[async_trait]
impl TokenSource for ClientSecretCredential {
    async fn fetch_token(&self) -> ProviderResult<AccessToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("resource", self.resource.as_str()),
        ];

        let response = self
            .http
            .post_form(&self.token_url, &form)
            .await
            .map_err(|e| ProviderError::Auth(e.to_string()))?;

        parse_token_response(&response)
    }
}

/// Parse a token endpoint response; v1 endpoints report `expires_in` as a string
fn parse_token_response(response: &Value) -> ProviderResult<AccessToken> {
    let token = response
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::Auth("token response has no access_token".to_string()))?;

    let expires_in = response
        .get("expires_in")
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TOKEN_TTL);

    Ok(AccessToken {
        token: token.to_string(),
        expires_in,
    })
}

/// A token supplied up front (ARM_ACCESS_TOKEN, tests)
pub struct StaticToken(String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn fetch_token(&self) -> ProviderResult<AccessToken> {
        Ok(AccessToken {
            token: self.0.clone(),
            expires_in: DEFAULT_TOKEN_TTL,
        })
    }
}

/// ARM credentials holder with token caching
#[derive(Clone)]
pub struct ArmCredentials {
    source: Arc<dyn TokenSource>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl ArmCredentials {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Build credentials from provider configuration
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(Self::static_token(token));
        }

        let (Some(tenant), Some(client_id), Some(secret)) = (
            config.tenant_id.as_deref(),
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
        ) else {
            return Err(ProviderError::Auth(
                "tenant_id, client_id and client_secret are all required (or set ARM_ACCESS_TOKEN)"
                    .to_string(),
            ));
        };

        let credential = ClientSecretCredential::new(
            &config.effective_authentication_endpoint(),
            tenant,
            client_id,
            secret,
            &config.effective_token_audience(),
        )?;

        Ok(Self::new(Arc::new(credential)))
    }

    pub fn static_token(token: &str) -> Self {
        Self::new(Arc::new(StaticToken(token.to_string())))
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> ProviderResult<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let issued = self.source.fetch_token().await?;
        let ttl = issued.expires_in.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: issued.token.clone(),
                expires_at: Instant::now() + ttl,
            });
        }

        tracing::debug!("New token cached, expires in ~{} minutes", ttl.as_secs() / 60);

        Ok(issued.token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> ProviderResult<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        ttl: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> ProviderResult<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken {
                token: format!("token-{}", n),
                expires_in: self.ttl,
            })
        }
    }

    #[test]
    fn test_parse_token_response_string_expiry() {
        let token = parse_token_response(&json!({
            "access_token": "abc",
            "expires_in": "3599"
        }))
        .unwrap();
        assert_eq!(token.token, "abc");
        assert_eq!(token.expires_in, Duration::from_secs(3599));
    }

    #[test]
    fn test_parse_token_response_missing_token() {
        let err = parse_token_response(&json!({"expires_in": 10})).unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[tokio::test]
    async fn test_token_is_cached_until_expiry() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            ttl: Duration::from_secs(3600),
        });
        let creds = ArmCredentials::new(source.clone());

        assert_eq!(creds.get_token().await.unwrap(), "token-0");
        assert_eq!(creds.get_token().await.unwrap(), "token-0");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert_eq!(creds.refresh_token().await.unwrap(), "token-1");
    }

    #[tokio::test]
    async fn test_short_lived_tokens_are_not_reused() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            ttl: Duration::from_secs(30),
        });
        let creds = ArmCredentials::new(source.clone());

        creds.get_token().await.unwrap();
        creds.get_token().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_config_requires_secret() {
        let config = ProviderConfig {
            tenant_id: Some("t".into()),
            client_id: Some("c".into()),
            ..Default::default()
        };
        assert!(matches!(
            ArmCredentials::from_config(&config),
            Err(ProviderError::Auth(_))
        ));
    }
}
