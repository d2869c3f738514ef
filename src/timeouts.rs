//! Operation timeouts and cancellation
//!
//! Every CRUD handler runs inside a timeout envelope; long-running loops
//! (paging, provisioning polls) check the [`StopContext`] between requests.

use crate::arm::error::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_CREATE: Duration = Duration::from_secs(30 * 60);
const DEFAULT_READ: Duration = Duration::from_secs(5 * 60);
const DEFAULT_UPDATE: Duration = Duration::from_secs(30 * 60);
const DEFAULT_DELETE: Duration = Duration::from_secs(30 * 60);

/// Per-operation overrides, in seconds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    #[serde(default)]
    pub create: Option<u64>,
    #[serde(default)]
    pub read: Option<u64>,
    #[serde(default)]
    pub update: Option<u64>,
    #[serde(default)]
    pub delete: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_CREATE,
            read: DEFAULT_READ,
            update: DEFAULT_UPDATE,
            delete: DEFAULT_DELETE,
        }
    }
}

impl Timeouts {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        let defaults = Self::default();
        Self {
            create: config.create.map(Duration::from_secs).unwrap_or(defaults.create),
            read: config.read.map(Duration::from_secs).unwrap_or(defaults.read),
            update: config.update.map(Duration::from_secs).unwrap_or(defaults.update),
            delete: config.delete.map(Duration::from_secs).unwrap_or(defaults.delete),
        }
    }
}

/// Caller-owned cancellation signal threaded through every operation
#[derive(Debug, Clone, Default)]
pub struct StopContext {
    token: CancellationToken,
}

impl StopContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with `Cancelled` once the stop signal has fired
    pub fn check(&self) -> ProviderResult<()> {
        if self.is_cancelled() {
            Err(ProviderError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep between polls, waking early on cancellation
    pub async fn sleep(&self, duration: Duration) -> ProviderResult<()> {
        tokio::select! {
            _ = self.token.cancelled() => Err(ProviderError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Run `fut` to completion or fail with `Timeout` once `limit` elapses
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}
