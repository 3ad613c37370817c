//! JWKS cache configuration.
//!
//! Configuration can be built in code or loaded from environment variables.
//! Every constructor that accepts a config validates it first.

use crate::error::JwksError;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default time-to-live of a fetched key list (1 hour).
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(3600);

/// Default budget for a single refresh, including the wait for the refresh lock.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Default window before expiry in which a background refresh is triggered.
pub const DEFAULT_PREEMPTIVE_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid time to live configuration: {0}")]
    InvalidTimeToLive(String),

    #[error("Invalid refresh timeout configuration: {0}")]
    InvalidRefreshTimeout(String),

    #[error("Invalid preemptive window configuration: {0}")]
    InvalidPreemptiveWindow(String),
}

impl From<ConfigError> for JwksError {
    fn from(err: ConfigError) -> Self {
        JwksError::Configuration(err.to_string())
    }
}

/// Cache timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JwksCacheConfig {
    /// How long a fetched key list stays valid.
    pub ttl: Duration,

    /// Upper bound for one blocking refresh.
    pub refresh_timeout: Duration,

    /// How long before expiry a background refresh starts. Must not exceed `ttl`.
    pub preemptive_window: Duration,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TIME_TO_LIVE,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            preemptive_window: DEFAULT_PREEMPTIVE_WINDOW,
        }
    }
}

impl JwksCacheConfig {
    #[must_use]
    pub fn new(ttl: Duration, refresh_timeout: Duration, preemptive_window: Duration) -> Self {
        Self {
            ttl,
            refresh_timeout,
            preemptive_window,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_preemptive_window(mut self, window: Duration) -> Self {
        self.preemptive_window = window;
        self
    }

    /// Check the invariants the caches rely on.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TTL or refresh timeout is zero, or if the
    /// preemptive window exceeds the TTL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidTimeToLive(
                "time to live must be greater than 0".to_string(),
            ));
        }
        if self.refresh_timeout.is_zero() {
            return Err(ConfigError::InvalidRefreshTimeout(
                "refresh timeout must be greater than 0".to_string(),
            ));
        }
        if self.preemptive_window > self.ttl {
            return Err(ConfigError::InvalidPreemptiveWindow(format!(
                "time to live ({:?}) must exceed preemptive refresh window ({:?})",
                self.ttl, self.preemptive_window
            )));
        }
        Ok(())
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a variable is not a valid integer or the
    /// resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// Recognized keys: `JWKS_CACHE_TTL_SECONDS`, `JWKS_REFRESH_TIMEOUT_MS`,
    /// `JWKS_PREEMPTIVE_WINDOW_SECONDS`. Missing keys fall back to defaults.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let ttl = match vars.get("JWKS_CACHE_TTL_SECONDS") {
            Some(value_str) => Duration::from_secs(value_str.parse().map_err(|e| {
                ConfigError::InvalidTimeToLive(format!(
                    "JWKS_CACHE_TTL_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?),
            None => DEFAULT_TIME_TO_LIVE,
        };

        let refresh_timeout = match vars.get("JWKS_REFRESH_TIMEOUT_MS") {
            Some(value_str) => Duration::from_millis(value_str.parse().map_err(|e| {
                ConfigError::InvalidRefreshTimeout(format!(
                    "JWKS_REFRESH_TIMEOUT_MS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?),
            None => DEFAULT_REFRESH_TIMEOUT,
        };

        let preemptive_window = match vars.get("JWKS_PREEMPTIVE_WINDOW_SECONDS") {
            Some(value_str) => Duration::from_secs(value_str.parse().map_err(|e| {
                ConfigError::InvalidPreemptiveWindow(format!(
                    "JWKS_PREEMPTIVE_WINDOW_SECONDS must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?),
            None => DEFAULT_PREEMPTIVE_WINDOW,
        };

        let config = Self::new(ttl, refresh_timeout, preemptive_window);
        config.validate()?;
        Ok(config)
    }
}
