//! Error types for the JWKS cache.
//!
//! Errors are `Clone` so that a single failed refresh attempt can be handed
//! to every caller that was waiting on it.

use std::time::Duration;
use thiserror::Error;

/// Which side a source failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Client-caused, e.g. a misconfigured JWKS location (4xx).
    Client,
    /// Server-caused, e.g. remote unreachable or malformed response (5xx).
    Server,
}

/// Failure reported by a [`JwksSource`](crate::source::JwksSource).
///
/// The cache treats both kinds identically: the refresh attempt failed and the
/// previous entry is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} error fetching JWKS: {message}")]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

impl FetchError {
    /// Client-caused failure.
    pub fn client(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Client,
            message: message.into(),
        }
    }

    /// Server-caused failure.
    pub fn server(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Server,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors surfaced by the JWKS caches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwksError {
    /// Invalid cache configuration. Fatal at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The key source failed.
    #[error("JWKS fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The key source did not answer within the refresh timeout.
    #[error("JWKS refresh timed out after {0:?}")]
    Timeout(Duration),
}

impl JwksError {
    /// Whether the failure should be attributed to the caller's configuration
    /// rather than the remote service.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, JwksError::Fetch(e) if e.kind() == FetchErrorKind::Client)
    }

    /// HTTP status code an adapter should answer with when key lookup fails.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            JwksError::Configuration(_) => 500,
            JwksError::Fetch(e) => match e.kind() {
                FetchErrorKind::Client => 401,
                FetchErrorKind::Server => 503,
            },
            JwksError::Timeout(_) => 503,
        }
    }

    /// Bounded label for metrics.
    pub(crate) fn metric_status(&self) -> &'static str {
        match self {
            JwksError::Timeout(_) => "timeout",
            JwksError::Configuration(_) | JwksError::Fetch(_) => "error",
        }
    }
}
