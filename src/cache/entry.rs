//! Cache Entry Module
//!
//! Defines the structure for individual store entries with TTL support.

use std::time::{Duration, Instant};

// == Entry ==
/// Represents a single stored value with its absolute expiration time.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// Absolute expiration instant
    pub expires_at: Instant,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates a new entry expiring `ttl` from now.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration
    /// instant, so a fully elapsed TTL never yields the value again.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Same as [`Entry::is_expired`] against a caller-supplied clock reading,
    /// so a sweep can judge every entry against one instant.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}
