//! Hotspot Service
//!
//! The caller-facing facade: cached reads, coalesced and direct mutations,
//! metrics and administrative hooks. Owns the cache registry and every
//! component built on it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::batch::{BatchQueue, EnqueueAck, FlushReport, QueueSnapshot};
use crate::cache::{CacheRegistry, CacheStats};
use crate::config::Config;
use crate::error::{GatewayResult, Result, ServiceError};
use crate::gateway::{ActiveSession, DeviceGateway, OperationKind, SystemResources, UserRecord};
use crate::invalidation::Invalidator;
use crate::metrics::{ApiMetrics, MetricsRecorder};
use crate::read_path::{CachedReader, ReadCaches, Resource, ResourceKey};

pub struct HotspotService {
    registry: CacheRegistry,
    reader: CachedReader,
    invalidator: Invalidator,
    queue: BatchQueue,
    metrics: Arc<MetricsRecorder>,
}

impl HotspotService {
    /// Builds the registry, read caches and batch queue from `config`.
    ///
    /// Must be called from within a Tokio runtime (each cache starts its sweep).
    pub fn new(config: &Config, gateway: Arc<dyn DeviceGateway>) -> Result<Self> {
        let registry = CacheRegistry::new();
        let caches = ReadCaches::from_registry(&registry, &config.cache, &config.ttls)?;
        let metrics = Arc::new(MetricsRecorder::new());
        let invalidator = Invalidator::new(caches.clone());
        let reader = CachedReader::new(
            gateway.clone(),
            caches,
            config.ttls.clone(),
            metrics.clone(),
        );
        let queue = BatchQueue::new(
            config.batch.clone(),
            gateway,
            invalidator.clone(),
            metrics.clone(),
        )?;

        info!(caches = ?registry.names(), "Hotspot service initialized");

        Ok(Self {
            registry,
            reader,
            invalidator,
            queue,
            metrics,
        })
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn reader(&self) -> &CachedReader {
        &self.reader
    }

    pub fn queue(&self) -> &BatchQueue {
        &self.queue
    }

    // == Reads ==
    pub async fn read(&self, key: &ResourceKey, force_refresh: bool) -> GatewayResult<Resource> {
        self.reader.read(key, force_refresh).await
    }

    pub async fn active_sessions(&self, force_refresh: bool) -> GatewayResult<Vec<ActiveSession>> {
        self.reader.active_sessions(force_refresh).await
    }

    pub async fn user_sessions(
        &self,
        username: &str,
        force_refresh: bool,
    ) -> GatewayResult<Vec<ActiveSession>> {
        self.reader.user_sessions(username, force_refresh).await
    }

    pub async fn user_info(&self, username: &str, force_refresh: bool) -> GatewayResult<UserRecord> {
        self.reader.user_info(username, force_refresh).await
    }

    pub async fn list_users(&self, force_refresh: bool) -> GatewayResult<Vec<UserRecord>> {
        self.reader.list_users(force_refresh).await
    }

    pub async fn system_resources(&self, force_refresh: bool) -> GatewayResult<SystemResources> {
        self.reader.system_resources(force_refresh).await
    }

    // == Coalesced Mutations ==
    pub fn enqueue_create(&self, items: Vec<UserRecord>) -> Result<EnqueueAck> {
        self.enqueue(OperationKind::Create, items)
    }

    pub fn enqueue_update(&self, items: Vec<UserRecord>) -> Result<EnqueueAck> {
        self.enqueue(OperationKind::Update, items)
    }

    pub fn enqueue_delete(&self, items: Vec<UserRecord>) -> Result<EnqueueAck> {
        self.enqueue(OperationKind::Delete, items)
    }

    fn enqueue(&self, kind: OperationKind, items: Vec<UserRecord>) -> Result<EnqueueAck> {
        validate_items(&items)?;
        self.queue.enqueue(kind, items)
    }

    // == Direct Mutations ==
    /// Creates `items` now, in chunks; returns how many were applied.
    pub async fn create_batch(&self, items: Vec<UserRecord>) -> Result<usize> {
        self.apply_direct(OperationKind::Create, items).await
    }

    pub async fn update_batch(&self, items: Vec<UserRecord>) -> Result<usize> {
        self.apply_direct(OperationKind::Update, items).await
    }

    pub async fn delete_batch(&self, items: Vec<UserRecord>) -> Result<usize> {
        self.apply_direct(OperationKind::Delete, items).await
    }

    async fn apply_direct(&self, kind: OperationKind, items: Vec<UserRecord>) -> Result<usize> {
        validate_items(&items)?;
        Ok(self.queue.apply_direct(kind, items).await?)
    }

    /// Invalidates after a mutation made outside this service.
    pub async fn invalidate_user(&self, username: &str) -> usize {
        self.invalidator.invalidate_user(username).await
    }

    // == Queue ==
    pub async fn flush_now(&self) -> Vec<FlushReport> {
        self.queue.flush_now().await
    }

    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    /// See [`BatchQueue::failures`].
    pub fn failures(&self) -> Option<mpsc::UnboundedReceiver<FlushReport>> {
        self.queue.failures()
    }

    pub fn take_dead_letters(&self) -> Vec<FlushReport> {
        self.queue.take_dead_letters()
    }

    // == Admin ==
    pub fn metrics(&self) -> ApiMetrics {
        self.metrics.metrics()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
        info!("Metrics reset");
    }

    pub async fn clear_caches(&self) {
        self.registry.clear_all().await;
        info!("All caches cleared");
    }

    pub async fn cache_stats(&self) -> BTreeMap<String, CacheStats> {
        self.registry.stats().await
    }

    /// Flushes pending mutations, stops the flush timer and destroys every
    /// cache. Reads keep working afterwards, with expiry reclaimed lazily.
    pub async fn shutdown(&self) -> Vec<FlushReport> {
        let reports = self.queue.shutdown().await;
        self.registry.destroy();
        info!("Hotspot service shut down");
        reports
    }
}

impl std::fmt::Debug for HotspotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotspotService")
            .field("registry", &self.registry)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

fn validate_items(items: &[UserRecord]) -> Result<()> {
    if let Some(pos) = items.iter().position(|u| u.username.trim().is_empty()) {
        return Err(ServiceError::InvalidRequest(format!(
            "item {} has an empty username",
            pos
        )));
    }
    Ok(())
}
