//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is alive.
//!
//! # Tasks
//! - Expiry sweep: removes expired store entries at a configured interval

mod cleanup;

pub use cleanup::{Janitor, Sweep};
