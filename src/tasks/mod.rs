//! Background Tasks Module
//!
//! Contains background tasks owned by the cache manager.
//!
//! # Tasks
//! - Expiration sweep: removes entries past their stale-grace window at a
//!   per-namespace interval

mod sweep;

pub use sweep::spawn_sweep_task;
