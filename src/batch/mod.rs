//! Batch Module
//!
//! Write coalescing for device mutations. See [`BatchQueue`].

mod direct;
mod queue;
mod report;
mod state;

pub use queue::{BatchQueue, EnqueueAck, KindSnapshot, QueueSnapshot, DEAD_LETTER_CAPACITY};
pub use report::{FlushReport, FlushTrigger, QueueStats};
pub use state::{BatchOperation, KindState};
