//! Background Tasks Module
//!
//! Periodic work that runs beside the request paths.
//!
//! # Tasks
//! - Expiry sweep: reclaims memory held by expired cache entries

mod sweep;

pub use sweep::spawn_sweep_task;
