//! Background refresh tests for `PreemptiveJwksCache`.
//!
//! Most tests use `ManualScheduler` so dispatches can be counted exactly and
//! background refreshes run only when the test says so. The worker tests at
//! the end exercise `DedicatedWorker` and `SpawnScheduler` end to end.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use jwks_cache::{
    DedicatedWorker, FetchError, Jwk, JwksError, PreemptiveJwksCache, RefreshScheduler,
    SpawnScheduler, NO_GENERATION,
};
use jwks_test_utils::{
    at, eventually, init_test_tracing, scenario_config, test_config, ManualScheduler,
    MockJwksSource,
};
use std::sync::Arc;
use std::time::Duration;

fn manual_cache(
    source: &Arc<MockJwksSource>,
) -> Result<(PreemptiveJwksCache<Jwk>, Arc<ManualScheduler>)> {
    let scheduler = Arc::new(ManualScheduler::new());
    let cache = PreemptiveJwksCache::<Jwk>::with_scheduler(
        Arc::clone(source),
        &scenario_config(),
        Arc::clone(&scheduler) as Arc<dyn RefreshScheduler>,
    )?;
    Ok((cache, scheduler))
}

fn kid(cache: &PreemptiveJwksCache<Jwk>) -> Option<String> {
    cache
        .current()
        .and_then(|entry| entry.keys().first().and_then(|k| k.kid.clone()))
}

// ============================================================================
// Dispatch decisions
// ============================================================================

#[tokio::test]
async fn test_refresh_timeline() -> Result<()> {
    init_test_tracing();
    let source = MockJwksSource::rotating();
    let (cache, scheduler) = manual_cache(&source)?;

    // t=0: empty cache, blocking fetch
    let first = cache.get(at(0), false).await?;
    assert_eq!(first.expires_at(), at(10));
    assert_eq!(source.call_count(), 1);

    // t=6: valid and outside the window
    let read = cache.get(at(6), false).await?;
    assert!(Arc::ptr_eq(&first, &read));
    assert_eq!(scheduler.submitted(), 0);

    // t=8: inside the window, served from cache and dispatched once
    let read = cache.get(at(8), false).await?;
    assert!(Arc::ptr_eq(&first, &read));
    assert_eq!(scheduler.submitted(), 1);
    assert_eq!(source.call_count(), 1);

    // t=11: background refresh never ran, so this read refreshes inline
    let second = cache.get(at(11), false).await?;
    assert_eq!(second.expires_at(), at(21));
    assert_eq!(second.generation(), first.generation() + 1);
    assert_eq!(source.call_count(), 2);

    // The stale background refresh finds a newer entry and does not fetch
    assert_eq!(scheduler.run_all().await, 1);
    assert_eq!(source.call_count(), 2);
    assert!(Arc::ptr_eq(&second, &cache.current().unwrap()));

    // The new generation is eligible for its own dispatch
    cache.get(at(19), false).await?;
    assert_eq!(scheduler.submitted(), 2);
    Ok(())
}

#[tokio::test]
async fn test_background_refresh_installs_entry() -> Result<()> {
    let source = MockJwksSource::rotating();
    let (cache, scheduler) = manual_cache(&source)?;

    cache.get(at(0), false).await?;
    cache.get(at(8), false).await?;
    scheduler.run_all().await;

    let refreshed = cache.current().unwrap();
    assert_eq!(refreshed.generation(), 2);
    assert_eq!(refreshed.expires_at(), at(18));
    assert_eq!(kid(&cache).as_deref(), Some("key-1"));

    // Later reads are plain hits on the new entry
    let read = cache.get(at(12), false).await?;
    assert!(Arc::ptr_eq(&refreshed, &read));
    assert_eq!(source.call_count(), 2);
    assert_eq!(scheduler.submitted(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failed_background_refresh_redispatches_once() -> Result<()> {
    let source = MockJwksSource::rotating();
    let (cache, scheduler) = manual_cache(&source)?;

    let first = cache.get(at(0), false).await?;
    source.set_failing(FetchError::server("503 Service Unavailable"));

    cache.get(at(8), false).await?;
    assert_eq!(cache.dispatched_generation(), first.generation());
    scheduler.run_all().await;

    // Failure is swallowed; the old entry stays and the marker is cleared
    assert_eq!(cache.dispatched_generation(), NO_GENERATION);
    assert!(Arc::ptr_eq(&first, &cache.current().unwrap()));
    assert_eq!(source.call_count(), 2);

    // Readers keep getting the old entry, and exactly one new dispatch happens
    for _ in 0..3 {
        let read = cache.get(at(9), false).await?;
        assert!(Arc::ptr_eq(&first, &read));
    }
    assert_eq!(scheduler.submitted(), 2);

    source.set_rotating();
    scheduler.run_all().await;

    let refreshed = cache.current().unwrap();
    assert_eq!(refreshed.generation(), first.generation() + 1);
    assert_eq!(refreshed.expires_at(), at(19));
    Ok(())
}

#[tokio::test]
async fn test_expired_entry_with_failing_source_returns_error() -> Result<()> {
    let source = MockJwksSource::rotating();
    let (cache, scheduler) = manual_cache(&source)?;

    let first = cache.get(at(0), false).await?;
    source.set_failing(FetchError::client("404 Not Found"));

    let err = cache.get(at(10), false).await.unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(err.status_code(), 401);

    // The expired entry is kept, not discarded
    assert!(Arc::ptr_eq(&first, &cache.current().unwrap()));
    assert_eq!(scheduler.submitted(), 0);
    Ok(())
}

#[tokio::test]
async fn test_force_refresh_skips_background_path() -> Result<()> {
    let source = MockJwksSource::rotating();
    let (cache, scheduler) = manual_cache(&source)?;

    cache.get(at(0), false).await?;
    let forced = cache.get(at(8), true).await?;

    assert_eq!(forced.generation(), 2);
    assert_eq!(forced.expires_at(), at(18));
    assert_eq!(scheduler.submitted(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_in_window_dispatch_once() -> Result<()> {
    let source = MockJwksSource::rotating();
    let (cache, scheduler) = manual_cache(&source)?;
    let cache = Arc::new(cache);

    let first = cache.get(at(0), false).await?;

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get(at(8), false).await })
        })
        .collect();
    for handle in handles {
        let read = handle.await??;
        assert!(Arc::ptr_eq(&first, &read));
    }

    assert_eq!(scheduler.submitted(), 1);
    assert_eq!(source.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_window_larger_than_ttl_rejected() {
    let result =
        PreemptiveJwksCache::<Jwk>::new(MockJwksSource::rotating(), &test_config(10, 2, 11));
    assert!(matches!(result, Err(JwksError::Configuration(_))));
}

#[test]
fn test_default_worker_requires_runtime() {
    let result = PreemptiveJwksCache::<Jwk>::new(MockJwksSource::rotating(), &scenario_config());
    assert!(matches!(result, Err(JwksError::Configuration(_))));
}

// ============================================================================
// Schedulers
// ============================================================================

#[tokio::test]
async fn test_dedicated_worker_refreshes_in_background() -> Result<()> {
    let source = MockJwksSource::rotating();
    let cache = PreemptiveJwksCache::<Jwk>::new(Arc::clone(&source), &scenario_config())?;

    cache.get(at(0), false).await?;
    cache.get(at(8), false).await?;

    let refreshed = eventually(Duration::from_secs(5), || {
        cache.current().is_some_and(|e| e.generation() == 2)
    })
    .await;
    assert!(refreshed, "background refresh should install generation 2");
    assert_eq!(cache.current().unwrap().expires_at(), at(18));
    assert_eq!(source.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_slow_background_fetch_does_not_block_readers() -> Result<()> {
    let source = MockJwksSource::builder().gated().build_shared();
    let cache = PreemptiveJwksCache::<Jwk>::new(Arc::clone(&source), &scenario_config())?;

    source.release(1);
    let first = cache.get(at(0), false).await?;

    cache.get(at(8), false).await?;
    source.wait_for_calls(2, Duration::from_secs(5)).await;

    // The worker holds the refresh lock while parked on the gate
    let read = tokio::time::timeout(Duration::from_secs(1), cache.get(at(9), false))
        .await
        .expect("read of a valid entry should not wait on the background fetch")?;
    assert!(Arc::ptr_eq(&first, &read));

    source.release(1);
    let refreshed = eventually(Duration::from_secs(5), || {
        cache.current().is_some_and(|e| e.generation() == 2)
    })
    .await;
    assert!(refreshed);
    Ok(())
}

#[tokio::test]
async fn test_stopped_worker_falls_back_to_blocking_refresh() -> Result<()> {
    let source = MockJwksSource::rotating();
    let worker = Arc::new(DedicatedWorker::spawn()?);
    let cache = PreemptiveJwksCache::<Jwk>::with_scheduler(
        Arc::clone(&source),
        &scenario_config(),
        Arc::clone(&worker) as Arc<dyn RefreshScheduler>,
    )?;

    let first = cache.get(at(0), false).await?;
    worker.shutdown();

    // Dispatch is dropped by the stopped worker; the read still succeeds
    let read = cache.get(at(8), false).await?;
    assert!(Arc::ptr_eq(&first, &read));
    assert_eq!(source.call_count(), 1);

    let second = cache.get(at(11), false).await?;
    assert_eq!(second.generation(), 2);
    assert_eq!(second.expires_at(), at(21));
    assert_eq!(source.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_spawn_scheduler_refreshes_in_background() -> Result<()> {
    let source = MockJwksSource::rotating();
    let cache = PreemptiveJwksCache::<Jwk>::with_scheduler(
        Arc::clone(&source),
        &scenario_config(),
        Arc::new(SpawnScheduler::current()?),
    )?;

    cache.get(at(0), false).await?;
    cache.get(at(8), false).await?;

    let refreshed = eventually(Duration::from_secs(5), || {
        cache.current().is_some_and(|e| e.generation() == 2)
    })
    .await;
    assert!(refreshed);
    assert_eq!(kid(&cache).as_deref(), Some("key-1"));
    Ok(())
}
