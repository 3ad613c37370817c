//! Metrics definitions for the JWKS cache.
//!
//! All metrics follow Prometheus naming conventions:
//! - `jwks_cache_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `result`: 2 values (hit, refresh)
//! - `trigger`: 2 values (blocking, background)
//! - `status`: 3 values (success, error, timeout)

use metrics::{counter, histogram};
use std::time::Duration;

/// Refresh performed on the caller's task.
pub const TRIGGER_BLOCKING: &str = "blocking";

/// Refresh performed on the background scheduler.
pub const TRIGGER_BACKGROUND: &str = "background";

/// Record a read served straight from the cached entry.
///
/// Metric: `jwks_cache_reads_total`
/// Labels: `result`
pub fn record_cache_hit() {
    counter!("jwks_cache_reads_total", "result" => "hit").increment(1);
}

/// Record a read that had to go through the blocking refresh path.
///
/// Metric: `jwks_cache_reads_total`
/// Labels: `result`
pub fn record_cache_refresh_read() {
    counter!("jwks_cache_reads_total", "result" => "refresh").increment(1);
}

/// Record the outcome of one source fetch.
///
/// Metric: `jwks_cache_refreshes_total`, `jwks_cache_refresh_duration_seconds`
/// Labels: `trigger`, `status`
pub fn record_refresh(trigger: &'static str, status: &'static str, duration: Duration) {
    histogram!("jwks_cache_refresh_duration_seconds",
        "trigger" => trigger
    )
    .record(duration.as_secs_f64());

    counter!("jwks_cache_refreshes_total",
        "trigger" => trigger,
        "status" => status
    )
    .increment(1);
}

/// Record a background refresh being handed to the scheduler.
///
/// Metric: `jwks_cache_background_dispatches_total`
pub fn record_background_dispatch() {
    counter!("jwks_cache_background_dispatches_total").increment(1);
}
