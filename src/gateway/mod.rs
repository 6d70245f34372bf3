//! Device Gateway Module
//!
//! The boundary to the hotspot device's control API. Transport and
//! authentication live behind [`DeviceGateway`]; this crate only consumes it.

mod memory;
mod records;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;

pub use memory::{BatchCall, InMemoryGateway};
pub use records::{ActiveSession, SystemResources, UserRecord};

// == Operation Kind ==
/// Kind of a batched mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            OperationKind::Create => 0,
            OperationKind::Update => 1,
            OperationKind::Delete => 2,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Device Gateway ==
/// Calls against the hotspot device. Any call may succeed, fail transiently
/// (unavailable, timeout) or be rejected by the device.
///
/// Batch methods apply the whole slice or fail for the whole slice.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Every logged-in session.
    async fn active_sessions(&self) -> GatewayResult<Vec<ActiveSession>>;

    /// Sessions of one subscriber.
    async fn user_sessions(&self, username: &str) -> GatewayResult<Vec<ActiveSession>>;

    /// One subscriber account.
    async fn user_info(&self, username: &str) -> GatewayResult<UserRecord>;

    /// Every subscriber account.
    async fn list_users(&self) -> GatewayResult<Vec<UserRecord>>;

    /// Router resource usage.
    async fn system_resources(&self) -> GatewayResult<SystemResources>;

    async fn create_users(&self, users: &[UserRecord]) -> GatewayResult<()>;

    async fn update_users(&self, users: &[UserRecord]) -> GatewayResult<()>;

    async fn delete_users(&self, users: &[UserRecord]) -> GatewayResult<()>;

    /// Dispatches a batch to the mutation method for `kind`.
    async fn apply_batch(&self, kind: OperationKind, users: &[UserRecord]) -> GatewayResult<()> {
        match kind {
            OperationKind::Create => self.create_users(users).await,
            OperationKind::Update => self.update_users(users).await,
            OperationKind::Delete => self.delete_users(users).await,
        }
    }
}
