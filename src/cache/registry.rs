//! Cache Registry Module
//!
//! Directory of named, typed caches. The registry is an ordinary value that
//! callers construct and share; there is no process-global instance.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::cache::{Cache, CacheStats};
use crate::config::CacheConfig;
use crate::error::{Result, ServiceError};

/// Type-erased operations the registry needs on every cache.
#[async_trait]
trait ManagedCache: Send + Sync {
    async fn clear(&self);
    async fn stats(&self) -> CacheStats;
    fn destroy(&self);
}

#[async_trait]
impl<V> ManagedCache for Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn clear(&self) {
        Cache::clear(self).await;
    }

    async fn stats(&self) -> CacheStats {
        Cache::stats(self).await
    }

    fn destroy(&self) {
        Cache::destroy(self);
    }
}

struct Registered {
    config: CacheConfig,
    value_type: &'static str,
    typed: Arc<dyn Any + Send + Sync>,
    managed: Arc<dyn ManagedCache>,
}

// == Cache Registry ==
/// Name -> cache directory.
///
/// `get_cache` creates a cache on first request and returns the same instance
/// for every later request with the same name. A later request that asks for
/// a different value type or a different configuration is refused with
/// [`ServiceError::Configuration`] instead of being silently ignored.
#[derive(Default)]
pub struct CacheRegistry {
    caches: Mutex<BTreeMap<String, Registered>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Get Cache ==
    /// Returns the cache registered under `name`, creating it with `config`.
    ///
    /// Must be called from within a Tokio runtime the first time a name is
    /// requested, since creation starts the cache's sweep task.
    pub fn get_cache<V>(&self, name: &str, config: CacheConfig) -> Result<Arc<Cache<V>>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut caches = self.caches.lock();

        if let Some(existing) = caches.get(name) {
            if existing.config != config {
                return Err(ServiceError::Configuration(format!(
                    "cache '{}' already exists with {:?}, refusing {:?}",
                    name, existing.config, config
                )));
            }
            return existing.typed.clone().downcast::<Cache<V>>().map_err(|_| {
                ServiceError::Configuration(format!(
                    "cache '{}' holds {}, not {}",
                    name,
                    existing.value_type,
                    type_name::<V>()
                ))
            });
        }

        config.validate()?;

        let cache = Arc::new(Cache::<V>::new(name, config.clone()));
        info!(
            cache = name,
            max_size = config.max_size,
            ttl_ms = config.ttl.as_millis() as u64,
            "Cache created"
        );

        caches.insert(
            name.to_string(),
            Registered {
                config,
                value_type: type_name::<V>(),
                typed: cache.clone(),
                managed: cache.clone(),
            },
        );
        Ok(cache)
    }

    /// Names of every registered cache, sorted.
    pub fn names(&self) -> Vec<String> {
        self.caches.lock().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.caches.lock().contains_key(name)
    }

    /// Empties every registered cache.
    pub async fn clear_all(&self) {
        for cache in self.managed() {
            cache.clear().await;
        }
    }

    /// Per-cache statistics keyed by name.
    pub async fn stats(&self) -> BTreeMap<String, CacheStats> {
        let snapshot: Vec<(String, Arc<dyn ManagedCache>)> = self
            .caches
            .lock()
            .iter()
            .map(|(name, registered)| (name.clone(), registered.managed.clone()))
            .collect();

        let mut stats = BTreeMap::new();
        for (name, cache) in snapshot {
            stats.insert(name, cache.stats().await);
        }
        stats
    }

    // == Destroy ==
    /// Stops every sweep task and forgets every cache.
    ///
    /// Meant for orderly shutdown. Handles already given out keep working
    /// without a sweep.
    pub fn destroy(&self) {
        let drained = std::mem::take(&mut *self.caches.lock());
        for (name, registered) in drained {
            registered.managed.destroy();
            info!(cache = %name, "Cache destroyed");
        }
    }

    fn managed(&self) -> Vec<Arc<dyn ManagedCache>> {
        self.caches
            .lock()
            .values()
            .map(|registered| registered.managed.clone())
            .collect()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.names())
            .finish()
    }
}
