//! In-process device simulator.
//!
//! Behaves like a hotspot device holding a user table and a session list,
//! with adjustable latency, an outage switch and scripted batch failures.
//! Every call is logged so callers can see exactly what reached the device.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::{ActiveSession, DeviceGateway, OperationKind, SystemResources, UserRecord};
use crate::error::{GatewayError, GatewayResult};

/// One batch mutation that reached the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchCall {
    pub kind: OperationKind,
    pub usernames: Vec<String>,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct DeviceState {
    users: BTreeMap<String, UserRecord>,
    sessions: Vec<ActiveSession>,
    resources: SystemResources,
    read_latency: Duration,
    batch_latency: Duration,
    unreachable: bool,
    scripted_failures: VecDeque<GatewayError>,
    read_calls: HashMap<&'static str, usize>,
    batch_calls: Vec<BatchCall>,
}

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<DeviceState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the user table.
    pub fn with_users(self, users: impl IntoIterator<Item = UserRecord>) -> Self {
        {
            let mut state = self.state.lock();
            for user in users {
                state.users.insert(user.username.clone(), user);
            }
        }
        self
    }

    pub fn with_read_latency(self, latency: Duration) -> Self {
        self.state.lock().read_latency = latency;
        self
    }

    pub fn set_batch_latency(&self, latency: Duration) {
        self.state.lock().batch_latency = latency;
    }

    /// While set, every call fails with [`GatewayError::Unavailable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Makes the next batch call fail with `error`. Queued failures are
    /// consumed one per batch call.
    pub fn fail_next_batch(&self, error: GatewayError) {
        self.state.lock().scripted_failures.push_back(error);
    }

    pub fn add_session(&self, session: ActiveSession) {
        self.state.lock().sessions.push(session);
    }

    pub fn set_resources(&self, resources: SystemResources) {
        self.state.lock().resources = resources;
    }

    /// Current device-side record for `username`.
    pub fn user(&self, username: &str) -> Option<UserRecord> {
        self.state.lock().users.get(username).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().users.len()
    }

    /// How many times the read endpoint `operation` was called.
    pub fn read_calls(&self, operation: &str) -> usize {
        self.state
            .lock()
            .read_calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn batch_calls(&self) -> Vec<BatchCall> {
        self.state.lock().batch_calls.clone()
    }

    async fn begin_read(&self, operation: &'static str) -> GatewayResult<()> {
        let latency = {
            let mut state = self.state.lock();
            *state.read_calls.entry(operation).or_default() += 1;
            state.read_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.state.lock().unreachable {
            return Err(GatewayError::Unavailable("device unreachable".to_string()));
        }
        Ok(())
    }

    async fn run_batch<F>(
        &self,
        kind: OperationKind,
        users: &[UserRecord],
        apply: F,
    ) -> GatewayResult<()>
    where
        F: FnOnce(&mut DeviceState) -> GatewayResult<()> + Send,
    {
        let latency = self.state.lock().batch_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        let result = if state.unreachable {
            Err(GatewayError::Unavailable("device unreachable".to_string()))
        } else if let Some(error) = state.scripted_failures.pop_front() {
            Err(error)
        } else {
            apply(&mut *state)
        };

        state.batch_calls.push(BatchCall {
            kind,
            usernames: users.iter().map(|u| u.username.clone()).collect(),
            succeeded: result.is_ok(),
        });
        debug!(%kind, items = users.len(), ok = result.is_ok(), "Simulated batch call");
        result
    }
}

#[async_trait]
impl DeviceGateway for InMemoryGateway {
    async fn active_sessions(&self) -> GatewayResult<Vec<ActiveSession>> {
        self.begin_read("active_sessions").await?;
        Ok(self.state.lock().sessions.clone())
    }

    async fn user_sessions(&self, username: &str) -> GatewayResult<Vec<ActiveSession>> {
        self.begin_read("user_sessions").await?;
        Ok(self
            .state
            .lock()
            .sessions
            .iter()
            .filter(|s| s.username == username)
            .cloned()
            .collect())
    }

    async fn user_info(&self, username: &str) -> GatewayResult<UserRecord> {
        self.begin_read("user_info").await?;
        self.state
            .lock()
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("user '{}'", username)))
    }

    async fn list_users(&self) -> GatewayResult<Vec<UserRecord>> {
        self.begin_read("list_users").await?;
        Ok(self.state.lock().users.values().cloned().collect())
    }

    async fn system_resources(&self) -> GatewayResult<SystemResources> {
        self.begin_read("system_resources").await?;
        Ok(self.state.lock().resources.clone())
    }

    async fn create_users(&self, users: &[UserRecord]) -> GatewayResult<()> {
        self.run_batch(OperationKind::Create, users, |state| {
            if let Some(dup) = users.iter().find(|u| state.users.contains_key(&u.username)) {
                return Err(GatewayError::Rejected(format!(
                    "user '{}' already exists",
                    dup.username
                )));
            }
            for user in users {
                state.users.insert(user.username.clone(), user.clone());
            }
            Ok(())
        })
        .await
    }

    async fn update_users(&self, users: &[UserRecord]) -> GatewayResult<()> {
        self.run_batch(OperationKind::Update, users, |state| {
            if let Some(missing) = users.iter().find(|u| !state.users.contains_key(&u.username)) {
                return Err(GatewayError::Rejected(format!(
                    "user '{}' does not exist",
                    missing.username
                )));
            }
            for user in users {
                state.users.insert(user.username.clone(), user.clone());
            }
            Ok(())
        })
        .await
    }

    async fn delete_users(&self, users: &[UserRecord]) -> GatewayResult<()> {
        self.run_batch(OperationKind::Delete, users, |state| {
            if let Some(missing) = users.iter().find(|u| !state.users.contains_key(&u.username)) {
                return Err(GatewayError::Rejected(format!(
                    "user '{}' does not exist",
                    missing.username
                )));
            }
            for user in users {
                state.users.remove(&user.username);
                state.sessions.retain(|s| s.username != user.username);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, username: &str) -> ActiveSession {
        ActiveSession {
            id: id.to_string(),
            username: username.to_string(),
            address: "10.5.50.2".to_string(),
            mac_address: "00:11:22:33:44:55".to_string(),
            uptime_secs: 60,
            bytes_in: 1024,
            bytes_out: 2048,
        }
    }

    #[tokio::test]
    async fn test_reads_are_counted() {
        let gateway = InMemoryGateway::new().with_users([UserRecord::new("alice", "daily")]);

        let user = gateway.user_info("alice").await.unwrap();
        assert_eq!(user.profile, "daily");
        gateway.user_info("alice").await.unwrap();

        assert_eq!(gateway.read_calls("user_info"), 2);
        assert_eq!(gateway.read_calls("list_users"), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let gateway = InMemoryGateway::new();
        let err = gateway.user_info("ghost").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_atomically() {
        let gateway = InMemoryGateway::new().with_users([UserRecord::new("alice", "daily")]);

        let err = gateway
            .create_users(&[UserRecord::new("bob", "daily"), UserRecord::new("alice", "x")])
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Rejected(_)));
        assert!(gateway.user("bob").is_none());
        assert_eq!(gateway.batch_calls().len(), 1);
        assert!(!gateway.batch_calls()[0].succeeded);
    }

    #[tokio::test]
    async fn test_delete_drops_sessions() {
        let gateway = InMemoryGateway::new().with_users([UserRecord::new("alice", "daily")]);
        gateway.add_session(session("*1", "alice"));
        gateway.add_session(session("*2", "bob"));

        gateway
            .apply_batch(OperationKind::Delete, &[UserRecord::new("alice", "daily")])
            .await
            .unwrap();

        assert_eq!(gateway.user_count(), 0);
        let sessions = gateway.active_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].username, "bob");
    }

    #[tokio::test]
    async fn test_outage_and_scripted_failures() {
        let gateway = InMemoryGateway::new();

        gateway.set_unreachable(true);
        assert!(gateway.list_users().await.unwrap_err().is_transient());
        gateway.set_unreachable(false);

        gateway.fail_next_batch(GatewayError::Rejected("quota".into()));
        let first = gateway.create_users(&[UserRecord::new("a", "p")]).await;
        let second = gateway.create_users(&[UserRecord::new("a", "p")]).await;

        assert_eq!(first, Err(GatewayError::Rejected("quota".into())));
        assert!(second.is_ok());
    }
}
