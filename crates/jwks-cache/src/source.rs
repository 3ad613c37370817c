//! Key source and provider abstractions.
//!
//! A [`JwksSource`] is the slow collaborator that owns transport, retries and
//! response parsing. A [`JwksProvider`] is what authentication adapters call.

use crate::error::{FetchError, JwksError};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Fetches the current key list. May be slow and may fail.
#[async_trait::async_trait]
pub trait JwksSource<K>: Send + Sync {
    async fn fetch_jwks(&self) -> Result<Vec<K>, FetchError>;
}

#[async_trait::async_trait]
impl<K, S> JwksSource<K> for Arc<S>
where
    K: Send + 'static,
    S: JwksSource<K> + ?Sized,
{
    async fn fetch_jwks(&self) -> Result<Vec<K>, FetchError> {
        (**self).fetch_jwks().await
    }
}

/// Inbound interface used by authentication filters and interceptors.
#[async_trait::async_trait]
pub trait JwksProvider<K>: Send + Sync {
    /// Get the key list valid at `now`, refreshing first when `force_refresh`
    /// is set.
    async fn get_jwks(&self, now: DateTime<Utc>, force_refresh: bool)
        -> Result<Vec<K>, JwksError>;
}
