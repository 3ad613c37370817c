//! Pre-built keys, timestamps and configurations.

use chrono::{DateTime, Utc};
use jwks_cache::{Jwk, JwksCacheConfig};
use std::time::Duration;

/// Fixed epoch for test timestamps so expiry values are reproducible.
pub const TEST_EPOCH_SECS: i64 = 1_700_000_000;

/// Timestamp `secs` seconds after [`TEST_EPOCH_SECS`].
#[must_use]
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(TEST_EPOCH_SECS + secs, 0).expect("timestamp in range")
}

/// Ed25519 verification key with the given key ID.
#[must_use]
pub fn test_jwk(kid: &str) -> Jwk {
    Jwk {
        kty: "OKP".to_string(),
        kid: Some(kid.to_string()),
        alg: Some("EdDSA".to_string()),
        key_use: Some("sig".to_string()),
        n: None,
        e: None,
        crv: Some("Ed25519".to_string()),
        x: Some("dGVzdC1wdWJsaWMta2V5LWRhdGE".to_string()),
        y: None,
    }
}

/// `count` keys with IDs `test-key-0` .. `test-key-{count-1}`.
#[must_use]
pub fn test_key_set(count: usize) -> Vec<Jwk> {
    (0..count)
        .map(|i| test_jwk(&format!("test-key-{i}")))
        .collect()
}

/// Config with whole-second timings.
#[must_use]
pub fn test_config(ttl_secs: u64, refresh_timeout_secs: u64, window_secs: u64) -> JwksCacheConfig {
    JwksCacheConfig::new(
        Duration::from_secs(ttl_secs),
        Duration::from_secs(refresh_timeout_secs),
        Duration::from_secs(window_secs),
    )
}

/// TTL 10, refresh timeout 2, preemptive window 3.
#[must_use]
pub fn scenario_config() -> JwksCacheConfig {
    test_config(10, 2, 3)
}
