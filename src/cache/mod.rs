//! Cache Module
//!
//! Bounded in-memory caches with per-entry TTL, oldest-first eviction and a
//! background expiry sweep, plus the registry that names them.

mod entry;
mod handle;
mod order;
mod registry;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use handle::Cache;
pub use order::InsertionOrder;
pub use registry::CacheRegistry;
pub use stats::CacheStats;
pub use store::CacheStore;
