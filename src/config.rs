//! Configuration Module
//!
//! Handles loading cache construction parameters from environment variables.

use std::env;
use std::time::Duration;

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of keys the cache tracks
    pub capacity: usize,
    /// Time-to-live applied to every entry
    pub ttl: Duration,
    /// Interval between background sweeps of expired entries
    pub sweep_interval: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum tracked keys (default: 200)
    /// - `CACHE_TTL_SECS` - Entry TTL in seconds (default: 60)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Sweep frequency in seconds (default: 120)
    ///
    /// Missing, unparseable and zero values fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            capacity: env_u64("CACHE_CAPACITY")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(DEFAULT_CAPACITY),
            ttl: env_u64("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TTL),
            sweep_interval: env_u64("CACHE_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}

pub(crate) fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}
