//! Flush reports.
//!
//! Every flush attempt yields a [`FlushReport`]. Failed reports carry the
//! items so nothing handed to the gateway is lost without a trace.

use serde::Serialize;

use crate::error::GatewayError;
use crate::gateway::{OperationKind, UserRecord};

/// What started a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushTrigger {
    /// A kind reached the maximum batch size
    Size,
    /// The shared quiescence timer elapsed
    Timer,
    /// An explicit `flush_now` or shutdown
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub batch_id: u64,
    pub kind: OperationKind,
    pub trigger: FlushTrigger,
    pub items: Vec<UserRecord>,
    pub outcome: Result<(), GatewayError>,
}

impl FlushReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&GatewayError> {
        self.outcome.as_ref().err()
    }

    pub fn usernames(&self) -> Vec<&str> {
        self.items.iter().map(|u| u.username.as_str()).collect()
    }
}

/// Running totals over every flush attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub flushed_batches: u64,
    pub flushed_items: u64,
    pub failed_batches: u64,
    pub failed_items: u64,
}

impl QueueStats {
    pub(crate) fn record(&mut self, report: &FlushReport) {
        let items = report.items.len() as u64;
        if report.is_success() {
            self.flushed_batches += 1;
            self.flushed_items += items;
        } else {
            self.failed_batches += 1;
            self.failed_items += items;
        }
    }
}
