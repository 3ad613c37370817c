//! Observability for the JWKS cache.
//!
//! Logging goes through `tracing` with the targets `jwks.cache.sync`,
//! `jwks.cache.preemptive` and `jwks.cache.worker`. Key material is never
//! logged, only counts and generations.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `jwks_cache_reads_total` | Counter | `result` | Reads served from cache vs. refresh path |
//! | `jwks_cache_refreshes_total` | Counter | `trigger`, `status` | Source fetch outcomes |
//! | `jwks_cache_refresh_duration_seconds` | Histogram | `trigger` | Source fetch latency |
//! | `jwks_cache_background_dispatches_total` | Counter | none | Preemptive refreshes handed to the scheduler |

pub mod metrics;
