//! Error types for the cache
//!
//! Provides unified error handling using thiserror. None of these errors are
//! returned from the public cache operations; they are reported to the
//! tracing diagnostic sink.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The store evicted a key that the key index was not tracking
    #[error("failed to delete evicted key {0} from the key index")]
    IndexInconsistent(String),

    /// The background sweep thread could not be spawned
    #[error("sweeper unavailable: {0}")]
    SweeperUnavailable(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
