//! Device records exchanged with the hotspot control API.

use serde::{Deserialize, Serialize};

/// A hotspot subscriber account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Billing plan / rate-limit profile name on the device
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl UserRecord {
    pub fn new(username: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            profile: profile.into(),
            comment: None,
            disabled: false,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// A logged-in hotspot session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub id: String,
    pub username: String,
    pub address: String,
    pub mac_address: String,
    pub uptime_secs: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// Router resource usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemResources {
    pub uptime_secs: u64,
    /// CPU load percentage
    pub cpu_load: u8,
    pub free_memory: u64,
    pub total_memory: u64,
    pub version: String,
    pub board_name: String,
}
