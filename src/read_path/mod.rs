//! Cache-Aside Read Path
//!
//! Every device read goes through [`CachedReader`]: look in the resource's
//! cache, otherwise call the gateway and populate the cache on success only.
//! Failed calls are never cached and are returned unchanged.

mod caches;
mod keys;
mod reader;

pub use caches::{
    ReadCaches, SESSIONS_CACHE, SYSTEM_CACHE, USER_INFO_CACHE, USER_LIST_CACHE,
};
pub use keys::{
    user_info_key, user_sessions_key, Resource, ResourceKey, ACTIVE_SESSIONS_KEY,
    SYSTEM_RESOURCES_KEY, USER_LIST_KEY,
};
pub use reader::CachedReader;
