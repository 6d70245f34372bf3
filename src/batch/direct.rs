//! Immediate chunked batches that bypass coalescing.

use tracing::{error, info};

use super::queue::BatchQueue;
use crate::error::GatewayResult;
use crate::gateway::{OperationKind, UserRecord};

impl BatchQueue {
    /// Applies `items` now, one gateway call per chunk of `max_batch_size`.
    ///
    /// Chunks run sequentially. The first failing chunk aborts the rest and
    /// its error is returned; chunks applied before it stay applied and are
    /// invalidated. Returns the number of items applied.
    pub async fn apply_direct(
        &self,
        kind: OperationKind,
        items: Vec<UserRecord>,
    ) -> GatewayResult<usize> {
        let chunk_size = self.inner.config.max_batch_size;
        let total = items.len();
        let mut applied = 0;

        for (index, chunk) in items.chunks(chunk_size).enumerate() {
            if let Err(err) = self.inner.call_gateway(kind, chunk).await {
                error!(
                    %kind,
                    chunk = index,
                    applied,
                    remaining = total - applied,
                    error = %err,
                    "Direct batch aborted"
                );
                return Err(err);
            }
            self.inner.invalidator.invalidate_users(chunk).await;
            applied += chunk.len();
        }

        if total > 0 {
            info!(%kind, items = total, "Direct batch applied");
        }
        Ok(applied)
    }
}
