//! # JWKS Test Utilities
//!
//! Shared test utilities for the JWKS cache.
//!
//! This crate provides:
//! - `MockJwksSource` - scriptable key source with call counting, delays and gates
//! - `ManualScheduler` - background scheduler that runs tasks on demand
//! - `fixtures` - keys, timestamps and configurations
//! - `eventually` / `init_test_tracing` helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jwks_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let source = MockJwksSource::rotating();
//!     let scheduler = Arc::new(ManualScheduler::new());
//!     let cache = PreemptiveJwksCache::with_scheduler(
//!         Arc::clone(&source),
//!         &scenario_config(),
//!         scheduler.clone(),
//!     )
//!     .unwrap();
//!
//!     cache.get(at(0), false).await.unwrap();
//!     cache.get(at(8), false).await.unwrap();
//!     assert_eq!(scheduler.submitted(), 1);
//! }
//! ```

pub mod fixtures;
pub mod manual_scheduler;
pub mod mock_source;

pub use fixtures::*;
pub use manual_scheduler::ManualScheduler;
pub use mock_source::{MockJwksSource, MockJwksSourceBuilder};

use std::time::Duration;

/// Poll `condition` until it holds or `timeout` elapses.
///
/// Returns whether the condition was met. Works with paused tokio time.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to debug output for the cache targets.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jwks.cache=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
