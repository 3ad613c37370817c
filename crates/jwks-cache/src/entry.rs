//! Immutable cache entry.

use chrono::{DateTime, Utc};

/// Generation value that never belongs to a real entry.
pub const NO_GENERATION: u64 = 0;

/// One cached key list together with its expiry.
///
/// Entries are never mutated. A refresh builds a new entry and swaps it in;
/// readers that still hold the previous `Arc<CacheEntry>` keep a usable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<K> {
    keys: Vec<K>,
    expires_at: DateTime<Utc>,
    generation: u64,
}

impl<K> CacheEntry<K> {
    /// Create an entry. `generation` must be greater than [`NO_GENERATION`].
    #[must_use]
    pub fn new(keys: Vec<K>, expires_at: DateTime<Utc>, generation: u64) -> Self {
        Self {
            keys,
            expires_at,
            generation,
        }
    }

    #[must_use]
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Monotonic number identifying which refresh produced this entry.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` while `time` is strictly before the expiry.
    #[must_use]
    pub fn is_valid(&self, time: DateTime<Utc>) -> bool {
        time < self.expires_at
    }
}
