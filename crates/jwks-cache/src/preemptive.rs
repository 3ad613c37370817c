//! JWKS cache that refreshes ahead of expiry in the background.
//!
//! Refreshes are not continuously scheduled. They are lazily triggered by
//! reads that land inside the preemptive window (the last `preemptive_window`
//! of an entry's lifetime), and they run on a [`RefreshScheduler`] so the
//! reading task never waits on the source.
//!
//! # Dispatch
//!
//! A marker holds the generation of the newest entry for which a background
//! refresh was dispatched. Reads in the window compare against it without
//! locking; only when it is behind does a reader try (never wait) for the
//! dispatch lock, re-check, publish the new marker and submit the refresh.
//! A failed refresh resets the marker so the next read in the window
//! dispatches again.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::config::JwksCacheConfig;
use crate::entry::{CacheEntry, NO_GENERATION};
use crate::error::JwksError;
use crate::observability::metrics;
use crate::scheduler::{DedicatedWorker, RefreshScheduler};
use crate::source::{JwksProvider, JwksSource};
use crate::sync_cache::SynchronousJwksCache;

/// JWKS cache with lazily triggered background refresh.
pub struct PreemptiveJwksCache<K> {
    cache: Arc<SynchronousJwksCache<K>>,
    preemptive_window: TimeDelta,
    marker: Arc<AtomicU64>,
    dispatch_lock: Mutex<()>,
    scheduler: Arc<dyn RefreshScheduler>,
}

impl<K> std::fmt::Debug for PreemptiveJwksCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreemptiveJwksCache")
            .field("cache", &self.cache)
            .field("preemptive_window", &self.preemptive_window)
            .field("marker", &self.marker.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K> PreemptiveJwksCache<K>
where
    K: Clone + Send + Sync + 'static,
{
    /// Create a cache that owns a [`DedicatedWorker`] for background
    /// refreshes. The worker stops when the cache is dropped.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::Configuration` if the preemptive window exceeds the
    /// TTL, the config is otherwise invalid, or no tokio runtime is running.
    pub fn new<S>(source: S, config: &JwksCacheConfig) -> Result<Self, JwksError>
    where
        S: JwksSource<K> + 'static,
    {
        config.validate()?;
        let worker = DedicatedWorker::spawn()?;
        Self::with_scheduler(source, config, Arc::new(worker))
    }

    /// Create a cache that submits background refreshes to `scheduler`.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::Configuration` if the preemptive window exceeds the
    /// TTL or the config is otherwise invalid.
    pub fn with_scheduler<S>(
        source: S,
        config: &JwksCacheConfig,
        scheduler: Arc<dyn RefreshScheduler>,
    ) -> Result<Self, JwksError>
    where
        S: JwksSource<K> + 'static,
    {
        config.validate()?;
        let preemptive_window = TimeDelta::from_std(config.preemptive_window).map_err(|e| {
            JwksError::Configuration(format!("preemptive window out of range: {e}"))
        })?;

        Ok(Self {
            cache: Arc::new(SynchronousJwksCache::new(source, config)?),
            preemptive_window,
            marker: Arc::new(AtomicU64::new(NO_GENERATION)),
            dispatch_lock: Mutex::new(()),
            scheduler,
        })
    }

    /// Get an entry valid at `now`.
    ///
    /// Forced, missing and expired cases go through the blocking refresh of
    /// [`SynchronousJwksCache`]. A valid entry is returned immediately, after
    /// possibly dispatching a background refresh when it is close to expiry.
    ///
    /// # Errors
    ///
    /// Returns `JwksError::Fetch` or `JwksError::Timeout` only from the
    /// blocking path. Background failures are never surfaced.
    pub async fn get(
        &self,
        now: DateTime<Utc>,
        force_refresh: bool,
    ) -> Result<Arc<CacheEntry<K>>, JwksError> {
        match self.cache.current() {
            Some(entry) if !force_refresh && entry.is_valid(now) => {
                self.maybe_trigger_background_refresh(now, &entry);
                metrics::record_cache_hit();
                Ok(entry)
            }
            snapshot => {
                metrics::record_cache_refresh_read();
                self.cache
                    .get_blocking(now, snapshot.as_ref(), metrics::TRIGGER_BLOCKING)
                    .await
            }
        }
    }

    /// Dispatch a background refresh for `entry` if it is inside the
    /// preemptive window and none has been dispatched for its generation.
    /// Never blocks.
    pub fn maybe_trigger_background_refresh(&self, now: DateTime<Utc>, entry: &Arc<CacheEntry<K>>) {
        let horizon = now
            .checked_add_signed(self.preemptive_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if entry.is_valid(horizon) {
            return;
        }

        let generation = entry.generation();
        if self.marker.load(Ordering::Acquire) >= generation {
            return;
        }

        // Another reader is deciding right now; it will publish the marker.
        let Ok(_guard) = self.dispatch_lock.try_lock() else {
            return;
        };

        if self.marker.load(Ordering::Acquire) >= generation {
            return;
        }
        self.marker.store(generation, Ordering::Release);

        debug!(
            target: "jwks.cache.preemptive",
            generation,
            expires_at = %entry.expires_at(),
            "Dispatching background JWKS refresh"
        );
        metrics::record_background_dispatch();

        let cache = Arc::clone(&self.cache);
        let marker = Arc::clone(&self.marker);
        let entry = Arc::clone(entry);
        self.scheduler.submit(Box::pin(async move {
            if let Err(e) = cache
                .get_blocking(now, Some(&entry), metrics::TRIGGER_BACKGROUND)
                .await
            {
                // Make this generation eligible for another dispatch
                let _ = marker.compare_exchange(
                    generation,
                    NO_GENERATION,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                warn!(
                    target: "jwks.cache.preemptive",
                    generation,
                    error = %e,
                    "Background JWKS refresh failed, will retry on a later read"
                );
            }
        }));
    }

    /// The current entry, valid or not, without triggering a refresh.
    #[must_use]
    pub fn current(&self) -> Option<Arc<CacheEntry<K>>> {
        self.cache.current()
    }

    #[must_use]
    pub fn preemptive_window(&self) -> TimeDelta {
        self.preemptive_window
    }

    /// The scheduler that runs background refreshes.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<dyn RefreshScheduler> {
        &self.scheduler
    }

    /// Generation of the entry a background refresh was last dispatched for,
    /// or [`NO_GENERATION`].
    #[must_use]
    pub fn dispatched_generation(&self) -> u64 {
        self.marker.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl<K> JwksProvider<K> for PreemptiveJwksCache<K>
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
