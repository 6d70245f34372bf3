//! Configuration Module
//!
//! Loads process configuration from environment variables and defines the
//! per-cache and batch-queue configuration records.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, ServiceError};

// == Cache Config ==
/// Configuration of one named cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// Entry count ceiling
    pub max_size: usize,
    /// TTL for entries stored without an override
    pub ttl: Duration,
    /// Interval between expiry sweeps
    pub sweep_interval: Duration,
}

impl CacheConfig {
    pub fn new(max_size: usize, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            max_size,
            ttl,
            sweep_interval,
        }
    }

    /// Same config with a different default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Rejects configurations the registry refuses to build.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(ServiceError::Configuration(
                "max_size must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(ServiceError::Configuration(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

// == Batch Config ==
/// Configuration of the write-coalescing queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchConfig {
    /// Pending items of one kind that force an immediate flush
    pub max_batch_size: usize,
    /// Quiescence delay of the shared flush timer
    pub flush_delay: Duration,
    /// Watchdog around each queued flush call
    pub flush_timeout: Duration,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(ServiceError::Configuration(
                "max_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.flush_delay.is_zero() || self.flush_timeout.is_zero() {
            return Err(ServiceError::Configuration(
                "flush_delay and flush_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            flush_delay: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(30),
        }
    }
}

// == Read TTLs ==
/// Time-to-live per read resource. Volatile data gets short TTLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadTtls {
    pub active_sessions: Duration,
    pub user_sessions: Duration,
    pub user_info: Duration,
    pub user_list: Duration,
    pub system_resources: Duration,
}

impl Default for ReadTtls {
    fn default() -> Self {
        Self {
            active_sessions: Duration::from_secs(30),
            user_sessions: Duration::from_secs(30),
            user_info: Duration::from_secs(300),
            user_list: Duration::from_secs(60),
            system_resources: Duration::from_secs(10),
        }
    }
}

// == Config ==
/// Process configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base configuration for every named cache
    pub cache: CacheConfig,
    /// Per-resource read TTLs
    pub ttls: ReadTtls,
    /// Coalescing queue settings
    pub batch: BatchConfig,
    /// Admin HTTP server port
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            ttls: ReadTtls::default(),
            batch: BatchConfig::default(),
            server_port: 3000,
        }
    }
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` (default: 1000)
    /// - `CACHE_DEFAULT_TTL_MS` (default: 300000); when set, also the TTL of
    ///   every read resource whose own `TTL_*` variable is unset
    /// - `CACHE_SWEEP_INTERVAL_MS` (default: 60000)
    /// - `TTL_ACTIVE_SESSIONS_MS`, `TTL_USER_SESSIONS_MS` (default: 30000)
    /// - `TTL_USER_INFO_MS` (default: 300000)
    /// - `TTL_USER_LIST_MS` (default: 60000)
    /// - `TTL_SYSTEM_RESOURCES_MS` (default: 10000)
    /// - `BATCH_MAX_SIZE` (default: 50)
    /// - `BATCH_FLUSH_DELAY_MS` (default: 5000)
    /// - `BATCH_FLUSH_TIMEOUT_MS` (default: 30000)
    /// - `SERVER_PORT` (default: 3000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from any variable source, see [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let ms = |name: &str| parse(&lookup, name).map(Duration::from_millis);

        let default_ttl = ms("CACHE_DEFAULT_TTL_MS");
        let read_ttl = |name: &str, builtin: Duration| ms(name).or(default_ttl).unwrap_or(builtin);

        Self {
            cache: CacheConfig {
                max_size: parse(&lookup, "CACHE_MAX_ENTRIES").unwrap_or(defaults.cache.max_size),
                ttl: default_ttl.unwrap_or(defaults.cache.ttl),
                sweep_interval: ms("CACHE_SWEEP_INTERVAL_MS")
                    .unwrap_or(defaults.cache.sweep_interval),
            },
            ttls: ReadTtls {
                active_sessions: read_ttl("TTL_ACTIVE_SESSIONS_MS", defaults.ttls.active_sessions),
                user_sessions: read_ttl("TTL_USER_SESSIONS_MS", defaults.ttls.user_sessions),
                user_info: read_ttl("TTL_USER_INFO_MS", defaults.ttls.user_info),
                user_list: read_ttl("TTL_USER_LIST_MS", defaults.ttls.user_list),
                system_resources: read_ttl(
                    "TTL_SYSTEM_RESOURCES_MS",
                    defaults.ttls.system_resources,
                ),
            },
            batch: BatchConfig {
                max_batch_size: parse(&lookup, "BATCH_MAX_SIZE")
                    .unwrap_or(defaults.batch.max_batch_size),
                flush_delay: ms("BATCH_FLUSH_DELAY_MS").unwrap_or(defaults.batch.flush_delay),
                flush_timeout: ms("BATCH_FLUSH_TIMEOUT_MS")
                    .unwrap_or(defaults.batch.flush_timeout),
            },
            server_port: parse(&lookup, "SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }
}

/// Unset and unparseable values both read as absent.
fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|v| v.trim().parse().ok())
}
