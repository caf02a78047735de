//! Bounded Cache - A capacity-limited in-process cache
//!
//! Provides a key/value cache with TTL expiration and capacity eviction of
//! the lexicographically smallest key.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{BoundedCache, CacheStats, ExpiringStore, KeyIndex, TtlStore};
pub use config::Config;
pub use error::{CacheError, Result};
