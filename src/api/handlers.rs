//! API Handlers
//!
//! HTTP request handlers for the admin endpoints.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::batch::QueueSnapshot;
use crate::error::Result;
use crate::gateway::SystemResources;
use crate::metrics::ApiMetrics;
use crate::models::{CachesResponse, ClearResponse, FlushResponse, HealthResponse, MessageResponse};
use crate::service::HotspotService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<HotspotService>,
}

impl AppState {
    pub fn new(service: Arc<HotspotService>) -> Self {
        Self { service }
    }
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<ApiMetrics> {
    Json(state.service.metrics())
}

/// Handler for POST /metrics/reset
pub async fn reset_metrics_handler(State(state): State<AppState>) -> Json<MessageResponse> {
    state.service.reset_metrics();
    Json(MessageResponse::new("Metrics reset"))
}

/// Handler for GET /caches
pub async fn caches_handler(State(state): State<AppState>) -> Json<CachesResponse> {
    Json(CachesResponse::new(state.service.cache_stats().await))
}

/// Handler for DELETE /caches
pub async fn clear_caches_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    let resident: usize = state
        .service
        .cache_stats()
        .await
        .values()
        .map(|s| s.size)
        .sum();
    state.service.clear_caches().await;

    Json(ClearResponse::new(resident))
}

/// Handler for POST /flush
///
/// Flushes every pending kind and waits for the gateway to answer.
pub async fn flush_handler(State(state): State<AppState>) -> Json<FlushResponse> {
    let reports = state.service.flush_now().await;
    Json(FlushResponse::new(&reports))
}

/// Handler for GET /queue
pub async fn queue_handler(State(state): State<AppState>) -> Json<QueueSnapshot> {
    Json(state.service.queue_snapshot())
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub refresh: bool,
}

/// Handler for GET /system
///
/// Router resources through the cache-aside read path; `?refresh=true`
/// bypasses the cache.
pub async fn system_handler(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Json<SystemResources>> {
    let resources = state.service.system_resources(params.refresh).await?;
    Ok(Json(resources))
}
