//! The typed caches backing device reads.

use std::sync::Arc;

use crate::cache::{Cache, CacheRegistry};
use crate::config::{CacheConfig, ReadTtls};
use crate::error::Result;
use crate::gateway::{ActiveSession, SystemResources, UserRecord};

/// Session lists: `active_sessions` and `user_sessions_<name>`.
pub const SESSIONS_CACHE: &str = "sessions";
/// Single accounts: `user_info_<name>`.
pub const USER_INFO_CACHE: &str = "user_info";
/// The account list: `active_users`.
pub const USER_LIST_CACHE: &str = "users";
/// Router resources: `system_resources`.
pub const SYSTEM_CACHE: &str = "system";

/// Handles to every cache the read path uses.
#[derive(Debug, Clone)]
pub struct ReadCaches {
    pub sessions: Arc<Cache<Vec<ActiveSession>>>,
    pub user_info: Arc<Cache<UserRecord>>,
    pub users: Arc<Cache<Vec<UserRecord>>>,
    pub system: Arc<Cache<SystemResources>>,
}

impl ReadCaches {
    /// Fetches (or creates) the read caches from `registry`.
    ///
    /// Each cache takes `base` with its default TTL set to the resource's TTL.
    pub fn from_registry(
        registry: &CacheRegistry,
        base: &CacheConfig,
        ttls: &ReadTtls,
    ) -> Result<Self> {
        Ok(Self {
            sessions: registry
                .get_cache(SESSIONS_CACHE, base.clone().with_ttl(ttls.active_sessions))?,
            user_info: registry.get_cache(USER_INFO_CACHE, base.clone().with_ttl(ttls.user_info))?,
            users: registry.get_cache(USER_LIST_CACHE, base.clone().with_ttl(ttls.user_list))?,
            system: registry
                .get_cache(SYSTEM_CACHE, base.clone().with_ttl(ttls.system_resources))?,
        })
    }
}
