//! Single-flight JWKS cache.
//!
//! Serves the cached key list without locking while it is valid. When the
//! entry is missing, expired, or a refresh is forced, exactly one caller
//! fetches from the source while the others wait on the refresh lock and then
//! reuse the winner's result, including its error.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::JwksCacheConfig;
use crate::entry::{CacheEntry, NO_GENERATION};
use crate::error::JwksError;
use crate::observability::metrics;
use crate::source::{JwksProvider, JwksSource};

/// State guarded by the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    /// Generation assigned to the most recently installed entry.
    generation: u64,
    /// Error of the most recent attempt, if it failed.
    last_failure: Option<JwksError>,
}

/// JWKS cache with a blocking, single-flight refresh.
pub struct SynchronousJwksCache<K> {
    source: Arc<dyn JwksSource<K>>,
    ttl: TimeDelta,
    refresh_timeout: Duration,
    current: ArcSwapOption<CacheEntry<K>>,
    refresh_lock: Mutex<RefreshState>,
    /// Number of finished fetch attempts. Lets a waiter tell whether an
    /// attempt completed while it was queued on the lock.
    completed_attempts: AtomicU64,
}

impl<K> std::fmt::Debug for SynchronousJwksCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronousJwksCache")
            .field("ttl", &self.ttl)
            .field("refresh_timeout", &self.refresh_timeout)
            .field(
                "generation",
                &self.current.load_full().map(|e| e.generation()),
            )
            .finish_non_exhaustive()
    }
}

impl<K> SynchronousJwksCache<K>
where
    K: Clone + Send + Sync + 'static,
{
    /// Create an empty cache in front of `source`.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::Configuration` if `config` is invalid.
    pub fn new<S>(source: S, config: &JwksCacheConfig) -> Result<Self, JwksError>
    where
        S: JwksSource<K> + 'static,
    {
        config.validate()?;
        let ttl = TimeDelta::from_std(config.ttl).map_err(|e| {
            JwksError::Configuration(format!("time to live out of range: {e}"))
        })?;

        Ok(Self {
            source: Arc::new(source),
            ttl,
            refresh_timeout: config.refresh_timeout,
            current: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(RefreshState::default()),
            completed_attempts: AtomicU64::new(0),
        })
    }

    /// Get an entry valid at `now`.
    ///
    /// Without `force_refresh` a valid cached entry is returned without
    /// locking. Otherwise the blocking refresh path runs.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::Fetch` or `JwksError::Timeout` when a refresh was
    /// needed and failed. The previous entry, if any, stays in place.
    pub async fn get(
        &self,
        now: DateTime<Utc>,
        force_refresh: bool,
    ) -> Result<Arc<CacheEntry<K>>, JwksError> {
        let snapshot = self.current.load_full();
        if !force_refresh {
            if let Some(entry) = snapshot.as_ref().filter(|e| e.is_valid(now)) {
                metrics::record_cache_hit();
                return Ok(Arc::clone(entry));
            }
        }

        metrics::record_cache_refresh_read();
        self.get_blocking(now, snapshot.as_ref(), metrics::TRIGGER_BLOCKING)
            .await
    }

    /// The current entry, valid or not, without triggering a refresh.
    #[must_use]
    pub fn current(&self) -> Option<Arc<CacheEntry<K>>> {
        self.current.load_full()
    }

    #[must_use]
    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    #[must_use]
    pub fn refresh_timeout(&self) -> Duration {
        self.refresh_timeout
    }

    /// Refresh unless someone else already replaced `snapshot`.
    ///
    /// `snapshot` is the entry the caller decided was unusable. After taking
    /// the lock, a different entry valid at `now` is returned as-is, and a
    /// failure of an attempt that finished while this caller waited is
    /// returned instead of fetching again.
    #[instrument(skip_all, fields(trigger = trigger))]
    pub(crate) async fn get_blocking(
        &self,
        now: DateTime<Utc>,
        snapshot: Option<&Arc<CacheEntry<K>>>,
        trigger: &'static str,
    ) -> Result<Arc<CacheEntry<K>>, JwksError> {
        let seen_generation = snapshot.map_or(NO_GENERATION, |e| e.generation());
        let seen_attempts = self.completed_attempts.load(Ordering::Acquire);

        let mut state = tokio::time::timeout(self.refresh_timeout, self.refresh_lock.lock())
            .await
            .map_err(|_| {
                warn!(
                    target: "jwks.cache.sync",
                    timeout = ?self.refresh_timeout,
                    "Timed out waiting for in-flight JWKS refresh"
                );
                JwksError::Timeout(self.refresh_timeout)
            })?;

        if let Some(current) = self.current.load_full() {
            if current.generation() != seen_generation && current.is_valid(now) {
                debug!(
                    target: "jwks.cache.sync",
                    generation = current.generation(),
                    "JWKS refreshed by concurrent caller"
                );
                return Ok(current);
            }
        }

        if self.completed_attempts.load(Ordering::Acquire) != seen_attempts {
            if let Some(err) = state.last_failure.clone() {
                debug!(
                    target: "jwks.cache.sync",
                    error = %err,
                    "Concurrent JWKS refresh failed, sharing its error"
                );
                return Err(err);
            }
        }

        debug!(target: "jwks.cache.sync", "Fetching JWKS from source");
        let started = Instant::now();
        let fetched = match tokio::time::timeout(self.refresh_timeout, self.source.fetch_jwks())
            .await
        {
            Ok(Ok(keys)) => Ok(keys),
            Ok(Err(e)) => Err(JwksError::Fetch(e)),
            Err(_) => Err(JwksError::Timeout(self.refresh_timeout)),
        };

        let outcome = match fetched {
            Ok(keys) => {
                state.generation += 1;
                let expires_at = now
                    .checked_add_signed(self.ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                let entry = Arc::new(CacheEntry::new(keys, expires_at, state.generation));
                self.current.store(Some(Arc::clone(&entry)));
                state.last_failure = None;

                info!(
                    target: "jwks.cache.sync",
                    key_count = entry.keys().len(),
                    generation = entry.generation(),
                    expires_at = %entry.expires_at(),
                    "JWKS cache refreshed"
                );
                metrics::record_refresh(trigger, "success", started.elapsed());
                Ok(entry)
            }
            Err(e) => {
                warn!(
                    target: "jwks.cache.sync",
                    error = %e,
                    has_previous = seen_generation != NO_GENERATION,
                    "JWKS refresh failed, keeping previous entry"
                );
                metrics::record_refresh(trigger, e.metric_status(), started.elapsed());
                state.last_failure = Some(e.clone());
                Err(e)
            }
        };

        self.completed_attempts.fetch_add(1, Ordering::AcqRel);
        outcome
    }
}

#[async_trait::async_trait]
impl<K> JwksProvider<K> for SynchronousJwksCache<K>
where
    K: Clone + Send + Sync + 'static,
{
    async fn get_jwks(
        &self,
        now: DateTime<Utc>,
        force_refresh: bool,
    ) -> Result<Vec<K>, JwksError> {
        let entry = self.get(now, force_refresh).await?;
        Ok(entry.keys().to_vec())
    }
}
