//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::batch::{FlushReport, FlushTrigger};
use crate::cache::CacheStats;
use crate::gateway::OperationKind;

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Plain acknowledgement, e.g. for POST /metrics/reset
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One cache's counters plus its hit rate.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// hits / (hits + misses)
    pub hit_rate: f64,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(stats: CacheStats) -> Self {
        let hit_rate = stats.hit_rate();
        Self { stats, hit_rate }
    }
}

/// Response body for GET /caches
#[derive(Debug, Clone, Serialize)]
pub struct CachesResponse {
    pub caches: BTreeMap<String, CacheStatsResponse>,
    /// Entries resident across every cache
    pub total_entries: usize,
}

impl CachesResponse {
    pub fn new(stats: BTreeMap<String, CacheStats>) -> Self {
        let total_entries = stats.values().map(|s| s.size).sum();
        Self {
            caches: stats
                .into_iter()
                .map(|(name, stats)| (name, stats.into()))
                .collect(),
            total_entries,
        }
    }
}

/// Response body for DELETE /caches
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Entries removed
    pub cleared: usize,
}

impl ClearResponse {
    pub fn new(cleared: usize) -> Self {
        Self {
            message: format!("Cleared {} cache entries", cleared),
            cleared,
        }
    }
}

/// Outcome of one flushed batch.
#[derive(Debug, Clone, Serialize)]
pub struct FlushReportResponse {
    pub batch_id: u64,
    pub kind: OperationKind,
    pub trigger: FlushTrigger,
    pub usernames: Vec<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FlushReport> for FlushReportResponse {
    fn from(report: &FlushReport) -> Self {
        Self {
            batch_id: report.batch_id,
            kind: report.kind,
            trigger: report.trigger,
            usernames: report.items.iter().map(|u| u.username.clone()).collect(),
            success: report.is_success(),
            error: report.error().map(ToString::to_string),
        }
    }
}

/// Response body for POST /flush
#[derive(Debug, Clone, Serialize)]
pub struct FlushResponse {
    pub batches: Vec<FlushReportResponse>,
    pub failed: usize,
}

impl FlushResponse {
    pub fn new(reports: &[FlushReport]) -> Self {
        Self {
            batches: reports.iter().map(Into::into).collect(),
            failed: reports.iter().filter(|r| !r.is_success()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::UserRecord;
    use std::time::Duration;

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_cache_stats_flattened_with_hit_rate() {
        let mut stats = CacheStats::new(10);
        stats.size = 2;
        stats.hits = 3;
        stats.misses = 1;

        let json = serde_json::to_value(CacheStatsResponse::from(stats)).unwrap();
        assert_eq!(json["size"], 2);
        assert_eq!(json["max_size"], 10);
        assert!((json["hit_rate"].as_f64().unwrap() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_caches_response_totals_entries() {
        let mut a = CacheStats::new(10);
        a.size = 2;
        let mut b = CacheStats::new(10);
        b.size = 5;
        let stats = BTreeMap::from([("a".to_string(), a), ("b".to_string(), b)]);

        assert_eq!(CachesResponse::new(stats).total_entries, 7);
    }

    #[test]
    fn test_flush_response_counts_failures() {
        let ok = FlushReport {
            batch_id: 1,
            kind: OperationKind::Create,
            trigger: FlushTrigger::Manual,
            items: vec![UserRecord::new("a", "p")],
            outcome: Ok(()),
        };
        let failed = FlushReport {
            batch_id: 2,
            kind: OperationKind::Delete,
            trigger: FlushTrigger::Manual,
            items: vec![UserRecord::new("b", "p")],
            outcome: Err(GatewayError::Timeout(Duration::from_secs(30))),
        };

        let resp = FlushResponse::new(&[ok, failed]);
        assert_eq!(resp.failed, 1);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["batches"][0]["kind"], "create");
        assert!(json["batches"][0].get("error").is_none());
        assert_eq!(json["batches"][1]["usernames"][0], "b");
        assert!(json["batches"][1]["error"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }
}
