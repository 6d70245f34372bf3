//! Cache-aside wrapper around the gateway's read endpoints.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::caches::ReadCaches;
use super::keys::{
    user_info_key, user_sessions_key, Resource, ResourceKey, ACTIVE_SESSIONS_KEY,
    SYSTEM_RESOURCES_KEY, USER_LIST_KEY,
};
use crate::cache::Cache;
use crate::config::ReadTtls;
use crate::error::GatewayResult;
use crate::gateway::{ActiveSession, DeviceGateway, SystemResources, UserRecord};
use crate::metrics::MetricsRecorder;

/// Serves device reads from cache when possible.
#[derive(Clone)]
pub struct CachedReader {
    gateway: Arc<dyn DeviceGateway>,
    caches: ReadCaches,
    ttls: ReadTtls,
    metrics: Arc<MetricsRecorder>,
}

impl CachedReader {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        caches: ReadCaches,
        ttls: ReadTtls,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            gateway,
            caches,
            ttls,
            metrics,
        }
    }

    pub fn caches(&self) -> &ReadCaches {
        &self.caches
    }

    pub async fn active_sessions(&self, force_refresh: bool) -> GatewayResult<Vec<ActiveSession>> {
        self.read_through(
            &self.caches.sessions,
            ACTIVE_SESSIONS_KEY,
            self.ttls.active_sessions,
            force_refresh,
            || self.gateway.active_sessions(),
        )
        .await
    }

    pub async fn user_sessions(
        &self,
        username: &str,
        force_refresh: bool,
    ) -> GatewayResult<Vec<ActiveSession>> {
        self.read_through(
            &self.caches.sessions,
            &user_sessions_key(username),
            self.ttls.user_sessions,
            force_refresh,
            || self.gateway.user_sessions(username),
        )
        .await
    }

    pub async fn user_info(&self, username: &str, force_refresh: bool) -> GatewayResult<UserRecord> {
        self.read_through(
            &self.caches.user_info,
            &user_info_key(username),
            self.ttls.user_info,
            force_refresh,
            || self.gateway.user_info(username),
        )
        .await
    }

    pub async fn list_users(&self, force_refresh: bool) -> GatewayResult<Vec<UserRecord>> {
        self.read_through(
            &self.caches.users,
            USER_LIST_KEY,
            self.ttls.user_list,
            force_refresh,
            || self.gateway.list_users(),
        )
        .await
    }

    pub async fn system_resources(&self, force_refresh: bool) -> GatewayResult<SystemResources> {
        self.read_through(
            &self.caches.system,
            SYSTEM_RESOURCES_KEY,
            self.ttls.system_resources,
            force_refresh,
            || self.gateway.system_resources(),
        )
        .await
    }

    /// Reads any resource by key.
    pub async fn read(&self, key: &ResourceKey, force_refresh: bool) -> GatewayResult<Resource> {
        match key {
            ResourceKey::ActiveSessions => self
                .active_sessions(force_refresh)
                .await
                .map(Resource::Sessions),
            ResourceKey::UserSessions(username) => self
                .user_sessions(username, force_refresh)
                .await
                .map(Resource::Sessions),
            ResourceKey::UserInfo(username) => self
                .user_info(username, force_refresh)
                .await
                .map(Resource::User),
            ResourceKey::UserList => self.list_users(force_refresh).await.map(Resource::Users),
            ResourceKey::SystemResources => self
                .system_resources(force_refresh)
                .await
                .map(Resource::System),
        }
    }

    // == Read Through ==
    async fn read_through<V, F, Fut>(
        &self,
        cache: &Cache<V>,
        key: &str,
        ttl: Duration,
        force_refresh: bool,
        fetch: F,
    ) -> GatewayResult<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<V>>,
    {
        if !force_refresh {
            if let Some(value) = cache.get(key).await {
                self.metrics.record_cache_hit();
                debug!(cache = cache.name(), key, "Cache hit");
                return Ok(value);
            }
        }

        self.metrics.record_cache_miss();
        debug!(cache = cache.name(), key, force_refresh, "Cache miss, calling gateway");

        let started = Instant::now();
        let result = fetch().await;
        self.metrics.record_api_call(result.is_ok(), started.elapsed());

        match result {
            Ok(value) => {
                cache.set(key, value.clone(), Some(ttl)).await;
                Ok(value)
            }
            Err(err) => {
                warn!(cache = cache.name(), key, error = %err, "Gateway read failed");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for CachedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedReader")
            .field("caches", &self.caches)
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}
