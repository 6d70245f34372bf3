//! Metrics Module
//!
//! Rolling gateway call and cache hit-rate metrics for operational tuning.

mod recorder;

pub use recorder::{ApiMetrics, MetricsRecorder, RESPONSE_WINDOW};
