//! Payment gateway error types.
//!
//! Every variant means "no mutation happened on our side": the caller may
//! retry the token request safely.

/// Errors from the gateway client.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// HTTP transport error (connection refused, timeout).
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// Gateway returned a non-2xx status.
    #[error("gateway {endpoint} returned {status}: {body}")]
    ApiError {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response body was not the expected JSON.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// Gateway answered and refused to issue a token.
    #[error("gateway rejected token request: {reason}")]
    Rejected { reason: String },
    /// The request could not be built from the given fields.
    #[error("invalid token request: {0}")]
    InvalidRequest(String),
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl GatewayError {
    /// Provider-supplied reason, when the gateway itself refused.
    pub fn provider_reason(&self) -> Option<&str> {
        match self {
            Self::Rejected { reason } => Some(reason),
            _ => None,
        }
    }

    /// True when the gateway was unreachable or answered with a server error.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
