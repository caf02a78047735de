//! Cache Module
//!
//! Provides an in-process cache with TTL expiration and capacity eviction
//! driven by an ordered key index.

use std::time::Duration;

mod bounded;
mod entry;
mod index;
mod stats;
mod store;


// Re-export public types
pub use bounded::BoundedCache;
pub use entry::Entry;
pub use index::KeyIndex;
pub use stats::{CacheStats, StatsRecorder};
pub use store::{EvictionHandler, ExpiringStore, TtlStore};

// == Public Constants ==
/// TTL used when none is configured
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Sweep interval used when none is configured, twice the default TTL
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Capacity used when none is configured
pub const DEFAULT_CAPACITY: usize = 200;
