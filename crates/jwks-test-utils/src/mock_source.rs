//! Mock JWKS source.
//!
//! Provides a `JwksSource<Jwk>` that can be configured to:
//! - Return fixed keys, or a fresh single-key set per call (`key-0`, `key-1`, ...)
//! - Return scripted responses in order before falling back
//! - Fail, optionally toggled at runtime
//! - Delay responses or hold them behind a gate until released
//!
//! # Example
//!
//! ```rust,ignore
//! use jwks_test_utils::MockJwksSource;
//!
//! let source = MockJwksSource::builder()
//!     .with_keys(test_key_set(2))
//!     .gated()
//!     .build_shared();
//!
//! // ... start concurrent reads, then
//! source.release(1);
//! assert_eq!(source.call_count(), 1);
//! ```

use async_trait::async_trait;
use jwks_cache::{FetchError, Jwk, JwksSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::fixtures::test_jwk;

/// What the source answers once scripted responses are used up.
#[derive(Debug, Clone)]
enum Fallback {
    Keys(Vec<Jwk>),
    Rotating,
    Fail(FetchError),
}

/// Configurable in-memory key source.
#[derive(Debug)]
pub struct MockJwksSource {
    responses: Mutex<VecDeque<Result<Vec<Jwk>, FetchError>>>,
    fallback: Mutex<Fallback>,
    delay: Option<Duration>,
    gate: Option<Semaphore>,
    call_count: AtomicUsize,
}

impl MockJwksSource {
    #[must_use]
    pub fn builder() -> MockJwksSourceBuilder {
        MockJwksSourceBuilder::default()
    }

    /// Source answering every call with a new single-key set.
    #[must_use]
    pub fn rotating() -> Arc<Self> {
        Self::builder().build_shared()
    }

    /// Source always answering with `keys`.
    #[must_use]
    pub fn returning(keys: Vec<Jwk>) -> Arc<Self> {
        Self::builder().with_keys(keys).build_shared()
    }

    /// Source always failing with `error`.
    #[must_use]
    pub fn failing(error: FetchError) -> Arc<Self> {
        Self::builder().failing(error).build_shared()
    }

    /// Number of fetches started so far, including ones still in flight.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Make subsequent fetches fail with `error`.
    pub fn set_failing(&self, error: FetchError) {
        *self.fallback.lock().unwrap() = Fallback::Fail(error);
    }

    /// Make subsequent fetches succeed with rotating keys again.
    pub fn set_rotating(&self) {
        *self.fallback.lock().unwrap() = Fallback::Rotating;
    }

    /// Let `n` gated fetches complete. No-op for ungated sources.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until at least `n` fetches have started.
    ///
    /// # Panics
    ///
    /// Panics if that does not happen within `timeout`.
    pub async fn wait_for_calls(&self, n: usize, timeout: Duration) {
        let reached = crate::eventually(timeout, || self.call_count() >= n).await;
        assert!(
            reached,
            "expected at least {n} fetches within {timeout:?}, got {}",
            self.call_count()
        );
    }

    fn next_response(&self, call: usize) -> Result<Vec<Jwk>, FetchError> {
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        match &*self.fallback.lock().unwrap() {
            Fallback::Keys(keys) => Ok(keys.clone()),
            Fallback::Rotating => Ok(vec![test_jwk(&format!("key-{call}"))]),
            Fallback::Fail(error) => Err(error.clone()),
        }
    }
}

#[async_trait]
impl JwksSource<Jwk> for MockJwksSource {
    async fn fetch_jwks(&self) -> Result<Vec<Jwk>, FetchError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.next_response(call)
    }
}

/// Builder for `MockJwksSource`.
#[derive(Debug)]
pub struct MockJwksSourceBuilder {
    responses: VecDeque<Result<Vec<Jwk>, FetchError>>,
    fallback: Fallback,
    delay: Option<Duration>,
    gated: bool,
}

impl Default for MockJwksSourceBuilder {
    fn default() -> Self {
        Self {
            responses: VecDeque::new(),
            fallback: Fallback::Rotating,
            delay: None,
            gated: false,
        }
    }
}

impl MockJwksSourceBuilder {
    /// Answer with `keys` once scripted responses are used up.
    #[must_use]
    pub fn with_keys(mut self, keys: Vec<Jwk>) -> Self {
        self.fallback = Fallback::Keys(keys);
        self
    }

    /// Fail with `error` once scripted responses are used up.
    #[must_use]
    pub fn failing(mut self, error: FetchError) -> Self {
        self.fallback = Fallback::Fail(error);
        self
    }

    /// Answer the next calls with `responses`, in order.
    #[must_use]
    pub fn with_responses(mut self, responses: Vec<Result<Vec<Jwk>, FetchError>>) -> Self {
        self.responses.extend(responses);
        self
    }

    /// Sleep before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold every fetch until [`MockJwksSource::release`] is called.
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gated = true;
        self
    }

    #[must_use]
    pub fn build(self) -> MockJwksSource {
        MockJwksSource {
            responses: Mutex::new(self.responses),
            fallback: Mutex::new(self.fallback),
            delay: self.delay,
            gate: self.gated.then(|| Semaphore::new(0)),
            call_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn build_shared(self) -> Arc<MockJwksSource> {
        Arc::new(self.build())
    }
}
