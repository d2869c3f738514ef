//! HTTP utilities for Azure Resource Manager REST calls

use super::error::{ProviderError, ProviderResult};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// A successful ARM response
#[derive(Debug, Clone)]
pub struct ArmResponse {
    pub status: u16,
    pub body: Value,
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> ProviderResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("azstack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Make a GET request to an ARM API
    pub async fn get(&self, url: &str, token: &str) -> ProviderResult<Value> {
        tracing::debug!("GET {}", url);

        let request = self.client.get(url).bearer_auth(token);
        Ok(self.execute(request, url).await?.body)
    }

    /// Make a PUT request to an ARM API
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> ProviderResult<ArmResponse> {
        tracing::debug!("PUT {}", url);

        let request = self.client.put(url).bearer_auth(token).json(body);
        self.execute(request, url).await
    }

    /// Make a DELETE request to an ARM API
    pub async fn delete(&self, url: &str, token: &str) -> ProviderResult<ArmResponse> {
        tracing::debug!("DELETE {}", url);

        let request = self.client.delete(url).bearer_auth(token);
        self.execute(request, url).await
    }

    /// POST a form without authentication (token endpoint)
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> ProviderResult<Value> {
        tracing::debug!("POST {}", url);

        let request = self.client.post(url).form(form);
        Ok(self.execute(request, url).await?.body)
    }

    async fn execute(&self, request: RequestBuilder, url: &str) -> ProviderResult<ArmResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::request(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::request(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            if status.as_u16() == 404 {
                tracing::debug!("{} returned 404", url);
            } else {
                // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            }
            return Err(ProviderError::from_status(status.as_u16(), url, &body));
        }

        // Handle empty response
        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|e| ProviderError::decode("response JSON", e))?
        };

        Ok(ArmResponse {
            status: status.as_u16(),
            body,
        })
    }
}
