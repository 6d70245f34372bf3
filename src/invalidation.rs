//! Cache Invalidation
//!
//! After a mutation succeeds on the device, the entries it could have made
//! stale are deleted, not refreshed. The next read repopulates on miss.

use tracing::debug;

use crate::gateway::UserRecord;
use crate::read_path::{user_info_key, user_sessions_key, ReadCaches};

/// Aggregate keys that any account mutation can make stale. Matched with
/// `contains` because aggregate results cannot be patched selectively.
pub const AGGREGATE_PATTERNS: [&str; 3] = ["active_users", "active_sessions", "user_sessions"];

#[derive(Debug, Clone)]
pub struct Invalidator {
    caches: ReadCaches,
}

impl Invalidator {
    pub fn new(caches: ReadCaches) -> Self {
        Self { caches }
    }

    /// Invalidates everything keyed on `username` plus the aggregates.
    pub async fn invalidate_user(&self, username: &str) -> usize {
        self.invalidate_usernames(std::iter::once(username)).await
    }

    /// Invalidates after a successful batch over `users`.
    pub async fn invalidate_users(&self, users: &[UserRecord]) -> usize {
        self.invalidate_usernames(users.iter().map(|u| u.username.as_str()))
            .await
    }

    async fn invalidate_usernames<'a>(&self, usernames: impl Iterator<Item = &'a str>) -> usize {
        let mut removed = 0;

        for username in usernames {
            if self.caches.user_info.delete(&user_info_key(username)).await {
                removed += 1;
            }
            if self.caches.sessions.delete(&user_sessions_key(username)).await {
                removed += 1;
            }
        }

        for pattern in AGGREGATE_PATTERNS {
            removed += self.caches.sessions.delete_matching(pattern).await;
            removed += self.caches.users.delete_matching(pattern).await;
        }

        debug!(removed, "Invalidated cache entries after mutation");
        removed
    }
}
