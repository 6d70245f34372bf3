//! Deterministic cache keys for device reads.

use serde::Serialize;

use crate::gateway::{ActiveSession, SystemResources, UserRecord};

pub const ACTIVE_SESSIONS_KEY: &str = "active_sessions";
pub const USER_LIST_KEY: &str = "active_users";
pub const SYSTEM_RESOURCES_KEY: &str = "system_resources";

pub fn user_info_key(username: &str) -> String {
    format!("user_info_{}", username)
}

pub fn user_sessions_key(username: &str) -> String {
    format!("user_sessions_{}", username)
}

/// A readable device resource and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    ActiveSessions,
    UserSessions(String),
    UserInfo(String),
    UserList,
    SystemResources,
}

impl ResourceKey {
    /// Cache key built from the operation name and its parameters.
    pub fn cache_key(&self) -> String {
        match self {
            ResourceKey::ActiveSessions => ACTIVE_SESSIONS_KEY.to_string(),
            ResourceKey::UserSessions(username) => user_sessions_key(username),
            ResourceKey::UserInfo(username) => user_info_key(username),
            ResourceKey::UserList => USER_LIST_KEY.to_string(),
            ResourceKey::SystemResources => SYSTEM_RESOURCES_KEY.to_string(),
        }
    }

    /// Name of the gateway read this key stands for.
    pub fn operation(&self) -> &'static str {
        match self {
            ResourceKey::ActiveSessions => "active_sessions",
            ResourceKey::UserSessions(_) => "user_sessions",
            ResourceKey::UserInfo(_) => "user_info",
            ResourceKey::UserList => "list_users",
            ResourceKey::SystemResources => "system_resources",
        }
    }
}

/// Value returned by a generic read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Sessions(Vec<ActiveSession>),
    User(UserRecord),
    Users(Vec<UserRecord>),
    System(SystemResources),
}
