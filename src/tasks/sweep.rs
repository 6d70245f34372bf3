//! Expiry Sweep Task
//!
//! Background task that periodically removes expired entries from one store.
//! Reads already treat expired entries as absent, so the sweep only reclaims
//! memory.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns the sweep loop for the store named `name`.
///
/// The task sleeps `interval` between passes and takes the write lock only
/// for the duration of one pass. Abort the returned handle to stop it.
///
/// # Example
/// ```ignore
/// let store = Arc::new(RwLock::new(CacheStore::<String>::new(1000, Duration::from_secs(300))));
/// let handle = spawn_sweep_task("user_info".into(), store.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweep_task<V>(
    name: String,
    store: Arc<RwLock<CacheStore<V>>>,
    interval: Duration,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(cache = %name, ?interval, "Starting expiry sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut guard = store.write().await;
                guard.sweep_expired()
            };

            if removed > 0 {
                info!(cache = %name, removed, "Expiry sweep reclaimed entries");
            } else {
                debug!(cache = %name, "Expiry sweep found nothing to reclaim");
            }
        }
    })
}
