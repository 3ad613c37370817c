//! Caching layer in front of a remotely sourced JSON Web Key Set.
//!
//! Callers on the authentication hot path read the cached key list without
//! lock contention. Two caches are provided:
//!
//! - [`SynchronousJwksCache`]: refreshes on miss or expiry, with at most one
//!   fetch in flight per cache.
//! - [`PreemptiveJwksCache`]: additionally refreshes in the background shortly
//!   before expiry, so readers in steady state never wait on the source.
//!
//! The caches do no network I/O. Fetching is delegated to a [`JwksSource`].
//!
//! # Example
//!
//! ```rust,ignore
//! use jwks_cache::{JwksCacheConfig, PreemptiveJwksCache};
//! use std::time::Duration;
//!
//! let config = JwksCacheConfig::default()
//!     .with_ttl(Duration::from_secs(3600))
//!     .with_preemptive_window(Duration::from_secs(60));
//!
//! let cache = PreemptiveJwksCache::new(my_source, &config)?;
//! let entry = cache.get(chrono::Utc::now(), false).await?;
//! for key in entry.keys() {
//!     // select by kid, verify...
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Module for cache configuration
pub mod config;

/// Module for the immutable cache entry
pub mod entry;

/// Module for error types
pub mod error;

/// Module for JSON Web Key types
pub mod jwk;

/// Module for metrics and logging conventions
pub mod observability;

/// Module for the background-refreshing cache
pub mod preemptive;

/// Module for background task schedulers
pub mod scheduler;

/// Module for source and provider traits
pub mod source;

/// Module for the single-flight cache
pub mod sync_cache;

pub use config::{ConfigError, JwksCacheConfig};
pub use entry::{CacheEntry, NO_GENERATION};
pub use error::{FetchError, FetchErrorKind, JwksError};
pub use jwk::{Jwk, JwkSet};
pub use preemptive::PreemptiveJwksCache;
pub use scheduler::{DedicatedWorker, RefreshScheduler, RefreshTask, SpawnScheduler};
pub use source::{JwksProvider, JwksSource};
pub use sync_cache::SynchronousJwksCache;
