//! Provider errors
//!
//! Every handler reports failures through [`ProviderError`] so callers can
//! tell a missing remote object apart from a failed request.

use std::time::Duration;
use thiserror::Error;

/// Maximum length of a remote error body kept in an error message
const MAX_ERROR_BODY_LENGTH: usize = 400;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{message}")]
    RequestFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("{0} was not found")]
    NotFound(String),

    #[error(
        "a resource with the ID {id:?} already exists - to be managed via this provider it needs \
         to be imported into the state (see the documentation for {resource_type:?})"
    )]
    RequiresImport { resource_type: String, id: String },

    #[error("parsing {kind} ID {input:?}: {reason}")]
    InvalidId {
        kind: &'static str,
        input: String,
        reason: String,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("decoding {what}: {reason}")]
    Decode { what: String, reason: String },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    /// Build an error from a non-success HTTP status
    pub fn from_status(status: u16, url: &str, body: &str) -> Self {
        if status == 404 {
            return Self::NotFound(strip_query(url).to_string());
        }

        let body = if body.len() > MAX_ERROR_BODY_LENGTH {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            &body[..end]
        } else {
            body
        };

        Self::RequestFailed {
            status: Some(status),
            message: format!("API request failed: {} - {}", status, body.trim()),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status: None,
            message: message.into(),
        }
    }

    pub fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::RequestFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Prefix request and decode failures with what was being done.
    ///
    /// Cancellation, timeouts and the remaining kinds pass through untouched.
    pub fn context(self, what: &str) -> Self {
        match self {
            Self::RequestFailed { status, message } => Self::RequestFailed {
                status,
                message: format!("{}: {}", what, message),
            },
            Self::Decode {
                what: inner,
                reason,
            } => Self::Decode {
                what: format!("{} ({})", what, inner),
                reason,
            },
            other => other,
        }
    }

    /// Collapse any remote failure into `RequestFailed`.
    ///
    /// Listing treats a missing collection the same as any other failed page.
    pub fn into_request_failed(self, what: &str) -> Self {
        match self {
            Self::Cancelled | Self::Timeout(_) | Self::Auth(_) => self,
            Self::RequestFailed { .. } => self.context(what),
            other => Self::RequestFailed {
                status: other.status(),
                message: format!("{}: {}", what, other),
            },
        }
    }
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Format a provider error for display
/// Security: Sanitizes error messages to avoid leaking API details
pub fn format_arm_error(error: &ProviderError) -> String {
    match error.status() {
        Some(401) => {
            return "Authentication failed. Check ARM_CLIENT_ID / ARM_CLIENT_SECRET.".to_string()
        }
        Some(403) => return "Permission denied. Check the role assignments of the principal.".to_string(),
        Some(404) => return "Resource not found.".to_string(),
        Some(409) => {
            return "Resource conflict. The resource may already exist or be in use.".to_string()
        }
        Some(429) => return "Rate limit exceeded. Please try again later.".to_string(),
        Some(400) => return "Invalid request. Check your parameters.".to_string(),
        Some(500..=599) => {
            return "Azure Stack service temporarily unavailable. Please try again.".to_string()
        }
        _ => {}
    }

    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(160)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
