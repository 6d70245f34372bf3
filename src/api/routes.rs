//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    caches_handler, clear_caches_handler, flush_handler, health_handler, metrics_handler,
    queue_handler, reset_metrics_handler, system_handler, AppState,
};

/// Creates the admin router.
///
/// # Endpoints
/// - `GET /health` - Health check
/// - `GET /metrics` - Gateway call and cache hit-rate metrics
/// - `POST /metrics/reset` - Zero every metric
/// - `GET /caches` - Per-cache statistics
/// - `DELETE /caches` - Empty every cache
/// - `POST /flush` - Flush the batch queue now
/// - `GET /queue` - Per-kind queue state
/// - `GET /system` - Cached router resources (`?refresh=true` bypasses the cache)
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/reset", post(reset_metrics_handler))
        .route("/caches", get(caches_handler).delete(clear_caches_handler))
        .route("/flush", post(flush_handler))
        .route("/queue", get(queue_handler))
        .route("/system", get(system_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
