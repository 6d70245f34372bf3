//! Metrics Recorder
//!
//! Counters plus a fixed-length window of recent response times.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Number of recent response times kept for the average.
pub const RESPONSE_WINDOW: usize = 100;

// == Api Metrics ==
/// Snapshot of the recorder's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub last_call_time: Option<DateTime<Utc>>,
    /// Mean of the response-time window, in milliseconds
    pub average_response_time: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// hits / (hits + misses) * 100
    pub cache_hit_rate: f64,
}

#[derive(Debug, Default)]
struct Inner {
    metrics: ApiMetrics,
    window: VecDeque<f64>,
}

// == Metrics Recorder ==
/// Thread-safe metrics sink. No method ever fails.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<Inner>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Api Call ==
    /// Records one gateway call and refreshes the average response time.
    pub fn record_api_call(&self, success: bool, elapsed: Duration) {
        let mut inner = self.inner.lock();

        inner.metrics.total_calls += 1;
        if success {
            inner.metrics.successful_calls += 1;
        } else {
            inner.metrics.failed_calls += 1;
        }
        inner.metrics.last_call_time = Some(Utc::now());

        if inner.window.len() == RESPONSE_WINDOW {
            inner.window.pop_front();
        }
        inner.window.push_back(elapsed.as_secs_f64() * 1000.0);

        let sum: f64 = inner.window.iter().sum();
        inner.metrics.average_response_time = sum / inner.window.len() as f64;
    }

    pub fn record_cache_hit(&self) {
        let mut inner = self.inner.lock();
        inner.metrics.cache_hits += 1;
        refresh_hit_rate(&mut inner.metrics);
    }

    pub fn record_cache_miss(&self) {
        let mut inner = self.inner.lock();
        inner.metrics.cache_misses += 1;
        refresh_hit_rate(&mut inner.metrics);
    }

    /// Current counters.
    pub fn metrics(&self) -> ApiMetrics {
        self.inner.lock().metrics.clone()
    }

    /// Number of samples currently in the response-time window.
    pub fn window_len(&self) -> usize {
        self.inner.lock().window.len()
    }

    /// Zeroes every counter and empties the window.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::default();
    }
}

fn refresh_hit_rate(metrics: &mut ApiMetrics) {
    let total = metrics.cache_hits + metrics.cache_misses;
    metrics.cache_hit_rate = if total == 0 {
        0.0
    } else {
        metrics.cache_hits as f64 / total as f64 * 100.0
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_recorder_is_zeroed() {
        let metrics = MetricsRecorder::new().metrics();
        assert_eq!(metrics, ApiMetrics::default());
        assert!(metrics.last_call_time.is_none());
    }

    #[test]
    fn test_record_api_call_counts_and_averages() {
        let recorder = MetricsRecorder::new();

        recorder.record_api_call(true, Duration::from_millis(10));
        recorder.record_api_call(true, Duration::from_millis(20));
        recorder.record_api_call(false, Duration::from_millis(30));

        let metrics = recorder.metrics();
        assert_eq!(metrics.total_calls, 3);
        assert_eq!(metrics.successful_calls, 2);
        assert_eq!(metrics.failed_calls, 1);
        assert!((metrics.average_response_time - 20.0).abs() < 1e-9);
        assert!(metrics.last_call_time.is_some());
    }

    #[test]
    fn test_window_drops_oldest_samples() {
        let recorder = MetricsRecorder::new();

        for _ in 0..RESPONSE_WINDOW {
            recorder.record_api_call(true, Duration::from_millis(1000));
        }
        for _ in 0..RESPONSE_WINDOW {
            recorder.record_api_call(true, Duration::from_millis(10));
        }

        let metrics = recorder.metrics();
        assert_eq!(recorder.window_len(), RESPONSE_WINDOW);
        assert_eq!(metrics.total_calls, 2 * RESPONSE_WINDOW as u64);
        assert!((metrics.average_response_time - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_hit_rate_is_a_percentage() {
        let recorder = MetricsRecorder::new();

        recorder.record_cache_miss();
        assert_eq!(recorder.metrics().cache_hit_rate, 0.0);

        recorder.record_cache_hit();
        recorder.record_cache_hit();
        recorder.record_cache_hit();

        let metrics = recorder.metrics();
        assert_eq!(metrics.cache_hits, 3);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.cache_hit_rate, 75.0);
    }

    #[test]
    fn test_reset_clears_window_too() {
        let recorder = MetricsRecorder::new();
        recorder.record_api_call(false, Duration::from_millis(500));
        recorder.record_cache_hit();

        recorder.reset();
        recorder.record_api_call(true, Duration::from_millis(4));

        let metrics = recorder.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.failed_calls, 0);
        assert_eq!(metrics.cache_hits, 0);
        assert!((metrics.average_response_time - 4.0).abs() < 1e-9);
    }
}
