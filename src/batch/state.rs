//! Per-kind queue state.

use std::collections::VecDeque;

use serde::Serialize;

use super::report::FlushTrigger;
use crate::gateway::{OperationKind, UserRecord};

/// Lifecycle of one operation kind.
///
/// | pending | queued or flushing | state |
/// |---|---|---|
/// | none | no | `Idle` |
/// | some | any | `Accumulating` |
/// | none | yes | `Flushing` |
///
/// A kind that is flushing still accepts new items: they start a fresh
/// pending operation instead of joining the one already handed to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KindState {
    Idle,
    Accumulating,
    Flushing,
}

/// Items of one kind waiting for, or handed to, one gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOperation {
    pub id: u64,
    pub kind: OperationKind,
    /// In enqueue order
    pub items: Vec<UserRecord>,
}

impl BatchOperation {
    pub fn new(id: u64, kind: OperationKind) -> Self {
        Self {
            id,
            kind,
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// An operation detached from the pending slot, waiting for its turn.
pub(crate) type Queued = (BatchOperation, FlushTrigger);

/// Queue bookkeeping for one kind. Only touched under the queue mutex.
///
/// Detached operations wait in `queued` in enqueue order. At most one of
/// them is with the gateway at any time (`flushing`), so a kind's batches
/// reach the device in the order their items were enqueued.
#[derive(Debug, Default)]
pub(crate) struct KindSlot {
    pending: Option<BatchOperation>,
    queued: VecDeque<Queued>,
    flushing: bool,
}

impl KindSlot {
    pub(crate) fn state(&self) -> KindState {
        match (&self.pending, self.in_flight()) {
            (Some(_), _) => KindState::Accumulating,
            (None, 0) => KindState::Idle,
            (None, _) => KindState::Flushing,
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, BatchOperation::len)
    }

    /// Detached operations not yet finished, including the one being flushed.
    pub(crate) fn in_flight(&self) -> usize {
        self.queued.len() + usize::from(self.flushing)
    }

    /// Appends items, creating the pending operation with `new_id` if needed.
    pub(crate) fn append(
        &mut self,
        kind: OperationKind,
        items: Vec<UserRecord>,
        new_id: impl FnOnce() -> u64,
    ) {
        self.pending
            .get_or_insert_with(|| BatchOperation::new(new_id(), kind))
            .items
            .extend(items);
    }

    /// Splits off full batches of `max` items from the front of the pending
    /// operation and queues them. The remainder stays pending.
    ///
    /// Returns how many batches were queued.
    pub(crate) fn take_full_batches(&mut self, max: usize, mut new_id: impl FnMut() -> u64) -> usize {
        let mut taken = 0;

        while self.pending_len() >= max {
            let Some(pending) = self.pending.as_mut() else {
                break;
            };
            let rest = pending.items.split_off(max);
            let full = if rest.is_empty() {
                match self.pending.take() {
                    Some(full) => full,
                    None => break,
                }
            } else {
                let full = BatchOperation {
                    id: pending.id,
                    kind: pending.kind,
                    items: std::mem::replace(&mut pending.items, rest),
                };
                pending.id = new_id();
                full
            };
            self.queued.push_back((full, FlushTrigger::Size));
            taken += 1;
        }

        taken
    }

    /// Queues the whole pending operation behind any earlier ones.
    pub(crate) fn detach(&mut self, trigger: FlushTrigger) -> bool {
        match self.pending.take() {
            Some(op) => {
                self.queued.push_back((op, trigger));
                true
            }
            None => false,
        }
    }

    /// Claims the oldest queued operation unless one is already flushing.
    ///
    /// The caller that receives `Some` owns the kind's flushing until
    /// [`KindSlot::finish`] returns `None`.
    pub(crate) fn start_flush(&mut self) -> Option<Queued> {
        if self.flushing {
            return None;
        }
        let next = self.queued.pop_front()?;
        self.flushing = true;
        Some(next)
    }

    /// Records that the flushing operation returned and hands over the next
    /// queued one, if any.
    pub(crate) fn finish(&mut self) -> Option<Queued> {
        let next = self.queued.pop_front();
        self.flushing = next.is_some();
        next
    }
}
