//! Hotspot Cache - caching and write coalescing in front of a hotspot device
//!
//! Serves device reads through bounded TTL caches and absorbs bursts of
//! subscriber mutations into batched device calls.

pub mod api;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod invalidation;
pub mod metrics;
pub mod models;
pub mod read_path;
pub mod service;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{GatewayError, ServiceError};
pub use service::HotspotService;
