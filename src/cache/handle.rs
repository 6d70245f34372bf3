//! Shared Cache Handle
//!
//! Thread-safe handle over a `CacheStore` that owns the store's sweep task.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::tasks::spawn_sweep_task;

// == Cache ==
/// A named, strongly typed cache shared between tasks.
///
/// Every store mutation happens under the store's write lock; the lock is
/// never held across a gateway call.
pub struct Cache<V> {
    name: String,
    config: CacheConfig,
    store: Arc<RwLock<CacheStore<V>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates the cache and starts its sweep task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        let name = name.into();
        let store = Arc::new(RwLock::new(CacheStore::new(config.max_size, config.ttl)));
        let sweeper = spawn_sweep_task(name.clone(), store.clone(), config.sweep_interval);

        Self {
            name,
            config,
            store,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.store.write().await.get(key)
    }

    /// Stores `value`; `ttl` overrides the cache's default TTL.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        self.store.write().await.set(key, value, ttl);
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.store.write().await.delete(key)
    }

    /// Deletes every unexpired key containing `pattern`. Returns how many went.
    pub async fn delete_matching(&self, pattern: &str) -> usize {
        let mut store = self.store.write().await;
        let keys = store.keys_matching(pattern);
        for key in &keys {
            store.delete(key);
        }
        keys.len()
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    pub async fn keys(&self) -> Vec<String> {
        self.store.read().await.keys()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Stops the sweep task. Entries stay readable, but expired ones are
    /// only reclaimed lazily from now on.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            debug!(cache = %self.name, "Cache sweep stopped");
        }
    }

    /// True while the sweep task is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
