//! Upstream Error Types

use thiserror::Error;

/// Errors raised while reading from the upstream platform.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The subscription's API key was rejected (401/403).
    #[error("Upstream rejected credential (HTTP {0})")]
    Unauthorized(u16),

    /// The requested resource no longer exists (404).
    #[error("Upstream resource not found")]
    NotFound,

    /// Any other non-2xx status.
    #[error("Upstream API error: HTTP {0}")]
    Status(u16),

    /// Transport failure (connect, timeout, reset).
    #[error("Upstream request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The configured API root is not a usable http(s) URL.
    #[error("Invalid upstream base URL: {0}")]
    InvalidBaseUrl(String),

    /// Response body did not match the expected shape.
    #[error("Upstream response could not be decoded: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Map a non-success status code to an error.
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(status),
            404 => Self::NotFound,
            _ => Self::Status(status),
        }
    }

    /// Whether this is a credential rejection that should suspend polling.
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
