//! API Module
//!
//! Admin HTTP surface over [`crate::service::HotspotService`].
//!
//! # Endpoints
//! - `GET /health` - Health check
//! - `GET /metrics`, `POST /metrics/reset` - Metrics snapshot and reset
//! - `GET /caches`, `DELETE /caches` - Cache statistics and clearing
//! - `POST /flush`, `GET /queue` - Batch queue control and inspection
//! - `GET /system` - Cached router resources

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
