//! Write-Coalescing Batch Queue
//!
//! Absorbs single-record mutations and hands them to the gateway in batches.
//! A kind flushes on its own as soon as it holds `max_batch_size` items; a
//! single shared timer flushes every non-empty kind after `flush_delay`.
//!
//! All queue bookkeeping sits behind one mutex that is never held across a
//! gateway call. A flush detaches its operation under the lock, so items
//! enqueued while it runs start a new operation. Each kind has at most one
//! gateway call outstanding; later batches of that kind wait their turn, so
//! they reach the device in enqueue order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::report::{FlushReport, FlushTrigger, QueueStats};
use super::state::{BatchOperation, KindSlot, KindState, Queued};
use crate::config::BatchConfig;
use crate::error::{GatewayError, GatewayResult, Result, ServiceError};
use crate::gateway::{DeviceGateway, OperationKind, UserRecord};
use crate::invalidation::Invalidator;
use crate::metrics::MetricsRecorder;

/// Failed reports kept when nobody listens on [`BatchQueue::failures`].
pub const DEAD_LETTER_CAPACITY: usize = 1024;

/// Acknowledgement that items were accepted into the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueAck {
    pub kind: OperationKind,
    pub accepted: usize,
    /// Items of this kind still waiting after any size-triggered flush
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindSnapshot {
    pub kind: OperationKind,
    pub state: KindState,
    pub pending: usize,
    pub in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub kinds: Vec<KindSnapshot>,
    pub timer_armed: bool,
    pub closed: bool,
    pub stats: QueueStats,
    pub dead_letters: usize,
}

#[derive(Default)]
struct QueueState {
    slots: [KindSlot; 3],
    timer: Option<JoinHandle<()>>,
    next_batch_id: u64,
    stats: QueueStats,
    closed: bool,
}

pub(super) struct QueueInner {
    pub(super) config: BatchConfig,
    gateway: Arc<dyn DeviceGateway>,
    pub(super) invalidator: Invalidator,
    metrics: Arc<MetricsRecorder>,
    state: Mutex<QueueState>,
    failures: Mutex<Option<mpsc::UnboundedSender<FlushReport>>>,
    dead_letters: Mutex<VecDeque<FlushReport>>,
    dead_letter_capacity: usize,
    idle: Notify,
}

// == Batch Queue ==
/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct BatchQueue {
    pub(super) inner: Arc<QueueInner>,
}

impl BatchQueue {
    pub fn new(
        config: BatchConfig,
        gateway: Arc<dyn DeviceGateway>,
        invalidator: Invalidator,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self> {
        Self::with_dead_letter_capacity(config, gateway, invalidator, metrics, DEAD_LETTER_CAPACITY)
    }

    /// Like [`BatchQueue::new`], keeping at most `capacity` dead letters.
    pub fn with_dead_letter_capacity(
        config: BatchConfig,
        gateway: Arc<dyn DeviceGateway>,
        invalidator: Invalidator,
        metrics: Arc<MetricsRecorder>,
        capacity: usize,
    ) -> Result<Self> {
        config.validate()?;
        if capacity == 0 {
            return Err(ServiceError::Configuration(
                "dead letter capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(QueueInner {
                config,
                gateway,
                invalidator,
                metrics,
                state: Mutex::new(QueueState::default()),
                failures: Mutex::new(None),
                dead_letters: Mutex::new(VecDeque::new()),
                dead_letter_capacity: capacity,
                idle: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    // == Enqueue ==
    /// Adds items to the pending operation of `kind`.
    ///
    /// Never waits on the gateway. Full batches are flushed on a spawned
    /// task; must be called from within a Tokio runtime.
    pub fn enqueue(&self, kind: OperationKind, items: Vec<UserRecord>) -> Result<EnqueueAck> {
        let accepted = items.len();

        let (full, start, pending) = {
            let mut guard = self.inner.state.lock();
            if guard.closed {
                return Err(ServiceError::QueueClosed);
            }

            let QueueState {
                slots,
                timer,
                next_batch_id,
                ..
            } = &mut *guard;
            let mut new_id = || {
                *next_batch_id += 1;
                *next_batch_id
            };

            let slot = &mut slots[kind.index()];
            if !items.is_empty() {
                slot.append(kind, items, &mut new_id);
            }
            let full = slot.take_full_batches(self.inner.config.max_batch_size, &mut new_id);
            let start = slot.start_flush();
            let pending = slot.pending_len();

            let any_pending = slots.iter().any(|s| s.pending_len() > 0);
            if any_pending && timer.is_none() {
                *timer = Some(self.inner.spawn_timer());
                debug!(delay = ?self.inner.config.flush_delay, "Flush timer armed");
            }

            (full, start, pending)
        };

        if full > 0 {
            info!(%kind, batches = full, "Batch size reached, flushing");
        }
        if let Some(first) = start {
            let _ = self.inner.spawn_drain(first);
        }

        Ok(EnqueueAck {
            kind,
            accepted,
            pending,
        })
    }

    pub fn enqueue_create(&self, items: Vec<UserRecord>) -> Result<EnqueueAck> {
        self.enqueue(OperationKind::Create, items)
    }

    pub fn enqueue_update(&self, items: Vec<UserRecord>) -> Result<EnqueueAck> {
        self.enqueue(OperationKind::Update, items)
    }

    pub fn enqueue_delete(&self, items: Vec<UserRecord>) -> Result<EnqueueAck> {
        self.enqueue(OperationKind::Delete, items)
    }

    // == Flush Now ==
    /// Flushes every non-empty kind and waits until no flush is in flight.
    ///
    /// Returns the reports of the batches this call sent. Batches of a kind
    /// whose flush was already running are sent by that flush, in order, and
    /// reported through [`BatchQueue::failures`] only if they fail.
    pub async fn flush_now(&self) -> Vec<FlushReport> {
        let drains: Vec<_> = self
            .inner
            .detach_all(FlushTrigger::Manual, false)
            .into_iter()
            .map(|first| self.inner.spawn_drain(first))
            .collect();

        let mut reports = Vec::new();
        for drain in drains {
            match drain.await {
                Ok(batch) => reports.extend(batch),
                Err(err) => error!(error = %err, "Flush task failed"),
            }
        }
        self.wait_idle().await;
        reports
    }

    /// Waits until no flush is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.all_idle() {
                return;
            }
            notified.await;
        }
    }

    // == Failures ==
    /// Receiver for failed flush reports.
    ///
    /// Returns `None` while another receiver is still alive. Failures that
    /// occur with no live receiver go to the dead-letter list instead.
    pub fn failures(&self) -> Option<mpsc::UnboundedReceiver<FlushReport>> {
        let mut sender = self.inner.failures.lock();
        if sender.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *sender = Some(tx);
        Some(rx)
    }

    /// Drains failed reports nobody received, oldest first.
    ///
    /// At most the dead-letter capacity is kept ([`DEAD_LETTER_CAPACITY`]
    /// unless set at construction); beyond that the oldest report is
    /// dropped with a warning.
    pub fn take_dead_letters(&self) -> Vec<FlushReport> {
        self.inner.dead_letters.lock().drain(..).collect()
    }

    pub fn state(&self, kind: OperationKind) -> KindState {
        self.inner.state.lock().slots[kind.index()].state()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let dead_letters = self.inner.dead_letters.lock().len();
        let state = self.inner.state.lock();

        QueueSnapshot {
            kinds: OperationKind::ALL
                .iter()
                .map(|kind| {
                    let slot = &state.slots[kind.index()];
                    KindSnapshot {
                        kind: *kind,
                        state: slot.state(),
                        pending: slot.pending_len(),
                        in_flight: slot.in_flight(),
                    }
                })
                .collect(),
            timer_armed: state.timer.is_some(),
            closed: state.closed,
            stats: state.stats.clone(),
            dead_letters,
        }
    }

    // == Shutdown ==
    /// Stops accepting items, cancels the timer, flushes what is pending and
    /// waits for in-flight flushes.
    ///
    /// The failure sender is released afterwards, so a receiver obtained from
    /// [`BatchQueue::failures`] sees every remaining report and then ends.
    pub async fn shutdown(&self) -> Vec<FlushReport> {
        let timer = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }

        let reports = self.flush_now().await;
        self.inner.failures.lock().take();
        info!(batches = reports.len(), "Batch queue shut down");
        reports
    }
}

impl std::fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueue")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl QueueInner {
    fn spawn_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let delay = self.config.flush_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for first in inner.detach_all(FlushTrigger::Timer, true) {
                let _ = inner.spawn_drain(first);
            }
        })
    }

    fn spawn_drain(self: &Arc<Self>, first: Queued) -> JoinHandle<Vec<FlushReport>> {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drain(first).await })
    }

    /// Queues every pending operation and claims the kinds nobody is
    /// flushing yet. Returns the first operation of each claimed kind.
    fn detach_all(&self, trigger: FlushTrigger, from_timer: bool) -> Vec<Queued> {
        let mut state = self.state.lock();
        if from_timer {
            state.timer = None;
        }
        state
            .slots
            .iter_mut()
            .filter_map(|slot| {
                slot.detach(trigger);
                slot.start_flush()
            })
            .collect()
    }

    // == Drain ==
    /// Flushes `first` and then every operation queued behind it for the
    /// same kind, one gateway call at a time.
    async fn drain(&self, first: Queued) -> Vec<FlushReport> {
        let kind = first.0.kind;
        let mut next = Some(first);
        let mut reports = Vec::new();

        while let Some((op, trigger)) = next {
            let report = self.run_flush(op, trigger).await;

            let idle = {
                let mut state = self.state.lock();
                state.stats.record(&report);
                next = state.slots[kind.index()].finish();
                state.slots.iter().all(|s| s.in_flight() == 0)
            };
            if !report.is_success() {
                self.report_failure(report.clone());
            }
            if idle {
                self.idle.notify_waiters();
            }
            reports.push(report);
        }

        reports
    }

    // == Run Flush ==
    async fn run_flush(&self, op: BatchOperation, trigger: FlushTrigger) -> FlushReport {
        let outcome = self.call_gateway(op.kind, &op.items).await;

        match &outcome {
            Ok(()) => {
                let removed = self.invalidator.invalidate_users(&op.items).await;
                info!(
                    kind = %op.kind,
                    batch_id = op.id,
                    items = op.len(),
                    ?trigger,
                    invalidated = removed,
                    "Batch flushed"
                );
            }
            Err(err) => {
                error!(
                    kind = %op.kind,
                    batch_id = op.id,
                    items = op.len(),
                    ?trigger,
                    error = %err,
                    "Batch flush failed"
                );
            }
        }

        FlushReport {
            batch_id: op.id,
            kind: op.kind,
            trigger,
            items: op.items,
            outcome,
        }
    }

    /// One gateway batch call under the flush watchdog, recorded in metrics.
    pub(super) async fn call_gateway(
        &self,
        kind: OperationKind,
        items: &[UserRecord],
    ) -> GatewayResult<()> {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            self.config.flush_timeout,
            self.gateway.apply_batch(kind, items),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.config.flush_timeout)),
        };
        self.metrics.record_api_call(outcome.is_ok(), started.elapsed());
        outcome
    }

    fn report_failure(&self, report: FlushReport) {
        let mut sender = self.failures.lock();
        let undelivered = match sender.as_ref() {
            Some(tx) => match tx.send(report) {
                Ok(()) => return,
                Err(mpsc::error::SendError(report)) => {
                    *sender = None;
                    report
                }
            },
            None => report,
        };

        warn!(
            kind = %undelivered.kind,
            batch_id = undelivered.batch_id,
            items = undelivered.items.len(),
            "No failure receiver, keeping report as dead letter"
        );

        let mut dead_letters = self.dead_letters.lock();
        if dead_letters.len() >= self.dead_letter_capacity {
            if let Some(dropped) = dead_letters.pop_front() {
                warn!(
                    capacity = self.dead_letter_capacity,
                    kind = %dropped.kind,
                    batch_id = dropped.batch_id,
                    users = ?dropped.usernames(),
                    "Dead letter list full, dropping oldest report"
                );
            }
        }
        dead_letters.push_back(undelivered);
    }

    fn all_idle(&self) -> bool {
        self.state.lock().slots.iter().all(|s| s.in_flight() == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRegistry;
    use crate::config::{CacheConfig, ReadTtls};
    use crate::gateway::InMemoryGateway;
    use crate::read_path::{user_info_key, ReadCaches};
    use std::collections::HashSet;
    use std::time::Duration;

    struct Fixture {
        gateway: Arc<InMemoryGateway>,
        queue: BatchQueue,
        caches: ReadCaches,
        metrics: Arc<MetricsRecorder>,
        _registry: CacheRegistry,
    }

    fn fixture(config: BatchConfig, gateway: InMemoryGateway) -> Fixture {
        fixture_with_capacity(config, gateway, DEAD_LETTER_CAPACITY)
    }

    fn fixture_with_capacity(
        config: BatchConfig,
        gateway: InMemoryGateway,
        capacity: usize,
    ) -> Fixture {
        let gateway = Arc::new(gateway);
        let registry = CacheRegistry::new();
        let caches =
            ReadCaches::from_registry(&registry, &CacheConfig::default(), &ReadTtls::default())
                .unwrap();
        let metrics = Arc::new(MetricsRecorder::new());
        let queue = BatchQueue::with_dead_letter_capacity(
            config,
            gateway.clone(),
            Invalidator::new(caches.clone()),
            metrics.clone(),
            capacity,
        )
        .unwrap();

        Fixture {
            gateway,
            queue,
            caches,
            metrics,
            _registry: registry,
        }
    }

    fn config(max_batch_size: usize, flush_delay_ms: u64) -> BatchConfig {
        BatchConfig {
            max_batch_size,
            flush_delay: Duration::from_millis(flush_delay_ms),
            flush_timeout: Duration::from_secs(5),
        }
    }

    fn users(prefix: &str, n: usize) -> Vec<UserRecord> {
        (0..n)
            .map(|i| UserRecord::new(format!("{}{}", prefix, i), "daily"))
            .collect()
    }

    #[tokio::test]
    async fn test_timer_flushes_small_batch_once() {
        let f = fixture(config(50, 100), InMemoryGateway::new());

        for user in users("u", 3) {
            f.queue.enqueue_create(vec![user]).unwrap();
        }
        assert!(f.gateway.batch_calls().is_empty());
        assert_eq!(f.queue.state(OperationKind::Create), KindState::Accumulating);

        tokio::time::sleep(Duration::from_millis(300)).await;

        let calls = f.gateway.batch_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, OperationKind::Create);
        assert_eq!(calls[0].usernames, vec!["u0", "u1", "u2"]);
        assert_eq!(f.queue.state(OperationKind::Create), KindState::Idle);
        assert!(!f.queue.snapshot().timer_armed);
    }

    #[tokio::test]
    async fn test_full_batch_flushes_without_timer() {
        let f = fixture(config(50, 60_000), InMemoryGateway::new());

        let ack = f.queue.enqueue_create(users("u", 50)).unwrap();
        assert_eq!(ack.accepted, 50);
        assert_eq!(ack.pending, 0);

        f.queue.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let calls = f.gateway.batch_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].usernames.len(), 50);
        assert_eq!(f.gateway.user_count(), 50);
        // nothing left pending, so no timer was needed
        assert!(!f.queue.snapshot().timer_armed);
    }

    #[tokio::test]
    async fn test_every_item_flushed_exactly_once() {
        let f = fixture(config(50, 60_000), InMemoryGateway::new());

        f.queue.enqueue_create(users("u", 120)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.queue.wait_idle().await;
        assert_eq!(f.queue.snapshot().kinds[0].pending, 20);

        let reports = f.queue.flush_now().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].trigger, FlushTrigger::Manual);

        let calls = f.gateway.batch_calls();
        assert_eq!(calls.len(), 3);
        let all: Vec<&String> = calls.iter().flat_map(|c| c.usernames.iter()).collect();
        let unique: HashSet<&String> = all.iter().copied().collect();
        assert_eq!(all.len(), 120);
        assert_eq!(unique.len(), 120);
        // FIFO within the kind
        assert_eq!(calls[0].usernames[0], "u0");
        assert!(calls.iter().all(|c| c.usernames.len() <= 50));
    }

    #[tokio::test]
    async fn test_timer_flushes_every_non_empty_kind() {
        let gateway = InMemoryGateway::new().with_users(users("old", 2));
        let f = fixture(config(50, 100), gateway);

        f.queue.enqueue_create(users("new", 1)).unwrap();
        f.queue.enqueue_delete(users("old", 2)).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        let calls = f.gateway.batch_calls();
        assert_eq!(calls.len(), 2);
        let kinds: HashSet<OperationKind> = calls.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&OperationKind::Create));
        assert!(kinds.contains(&OperationKind::Delete));
        assert!(f.gateway.user("old0").is_none());
        assert!(f.gateway.user("new0").is_some());
    }

    #[tokio::test]
    async fn test_failed_flush_is_reported_with_items() {
        let f = fixture(config(50, 60_000), InMemoryGateway::new());
        let mut failures = f.queue.failures().unwrap();
        assert!(f.queue.failures().is_none(), "only one live receiver");

        f.gateway
            .fail_next_batch(GatewayError::Unavailable("link down".into()));
        f.queue.enqueue_update(users("u", 2)).unwrap();
        let reports = f.queue.flush_now().await;

        assert!(!reports[0].is_success());
        let failed = failures.recv().await.unwrap();
        assert_eq!(failed.kind, OperationKind::Update);
        assert_eq!(failed.usernames(), vec!["u0", "u1"]);
        assert!(failed.error().unwrap().is_transient());

        let snapshot = f.queue.snapshot();
        assert_eq!(snapshot.stats.failed_batches, 1);
        assert_eq!(snapshot.stats.failed_items, 2);
        assert_eq!(f.metrics.metrics().failed_calls, 1);
    }

    #[tokio::test]
    async fn test_failures_without_receiver_become_dead_letters() {
        let f = fixture(config(50, 60_000), InMemoryGateway::new());

        // nobody subscribed
        f.queue.enqueue_update(users("ghost", 1)).unwrap();
        f.queue.flush_now().await;

        // subscriber dropped
        drop(f.queue.failures().unwrap());
        f.queue.enqueue_update(users("phantom", 1)).unwrap();
        f.queue.flush_now().await;

        let dead = f.queue.take_dead_letters();
        assert_eq!(dead.len(), 2);
        assert!(matches!(dead[0].error(), Some(GatewayError::Rejected(_))));
        assert_eq!(dead[1].usernames(), vec!["phantom0"]);
        assert!(f.queue.take_dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_dead_letters_drop_oldest_when_full() {
        let f = fixture_with_capacity(config(50, 60_000), InMemoryGateway::new(), 2);

        // updates of unknown users are rejected by the device
        for name in ["ghost", "phantom", "wraith"] {
            f.queue
                .enqueue_update(vec![UserRecord::new(name, "daily")])
                .unwrap();
            f.queue.flush_now().await;
        }

        assert_eq!(f.queue.snapshot().dead_letters, 2);
        let dead = f.queue.take_dead_letters();
        assert_eq!(dead[0].usernames(), vec!["phantom"]);
        assert_eq!(dead[1].usernames(), vec!["wraith"]);
        assert_eq!(f.queue.snapshot().stats.failed_batches, 3);
    }

    #[tokio::test]
    async fn test_failure_receiver_ends_after_shutdown() {
        let f = fixture(config(50, 60_000), InMemoryGateway::new());
        let mut failures = f.queue.failures().unwrap();

        f.gateway
            .fail_next_batch(GatewayError::Unavailable("link down".into()));
        f.queue.enqueue_create(users("u", 2)).unwrap();
        f.queue.shutdown().await;

        let failed = failures.recv().await.unwrap();
        assert_eq!(failed.usernames(), vec!["u0", "u1"]);
        assert!(failures.recv().await.is_none());
        assert!(f.queue.take_dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_watchdog_releases_hung_flush() {
        let f = fixture(
            BatchConfig {
                max_batch_size: 50,
                flush_delay: Duration::from_secs(60),
                flush_timeout: Duration::from_millis(50),
            },
            InMemoryGateway::new(),
        );
        f.gateway.set_batch_latency(Duration::from_secs(10));

        f.queue.enqueue_create(users("u", 1)).unwrap();
        let reports = f.queue.flush_now().await;

        assert!(matches!(reports[0].error(), Some(GatewayError::Timeout(_))));
        assert_eq!(f.queue.state(OperationKind::Create), KindState::Idle);
        assert_eq!(f.queue.take_dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_during_flush_starts_fresh_operation() {
        let f = fixture(config(2, 60_000), InMemoryGateway::new());
        f.gateway.set_batch_latency(Duration::from_millis(100));

        f.queue.enqueue_create(users("a", 2)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.queue.state(OperationKind::Create), KindState::Flushing);

        f.queue.enqueue_create(users("b", 1)).unwrap();
        assert_eq!(f.queue.state(OperationKind::Create), KindState::Accumulating);

        f.queue.wait_idle().await;
        f.gateway.set_batch_latency(Duration::ZERO);
        f.queue.flush_now().await;

        let calls = f.gateway.batch_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].usernames, vec!["a0", "a1"]);
        assert_eq!(calls[1].usernames, vec!["b0"]);
    }

    #[tokio::test]
    async fn test_one_kind_sends_one_batch_at_a_time() {
        let gateway = InMemoryGateway::new().with_users([UserRecord::new("alice", "daily")]);
        let f = fixture(config(1, 60_000), gateway);
        f.gateway.set_batch_latency(Duration::from_millis(100));

        f.queue
            .enqueue_update(vec![UserRecord::new("alice", "weekly")])
            .unwrap();
        f.queue
            .enqueue_update(vec![UserRecord::new("alice", "monthly")])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let update = f
            .queue
            .snapshot()
            .kinds
            .into_iter()
            .find(|k| k.kind == OperationKind::Update)
            .unwrap();
        assert_eq!(update.state, KindState::Flushing);
        assert_eq!(update.in_flight, 2);
        assert!(f.gateway.batch_calls().is_empty());

        tokio::time::sleep(Duration::from_millis(130)).await;
        // first batch done, second one now on the wire
        assert_eq!(f.gateway.batch_calls().len(), 1);
        assert_eq!(f.gateway.user("alice").unwrap().profile, "weekly");

        f.queue.wait_idle().await;
        assert_eq!(f.gateway.batch_calls().len(), 2);
        assert_eq!(f.gateway.user("alice").unwrap().profile, "monthly");
        assert_eq!(f.queue.state(OperationKind::Update), KindState::Idle);
    }

    #[tokio::test]
    async fn test_kinds_flush_independently() {
        let gateway = InMemoryGateway::new().with_users(users("old", 1));
        let f = fixture(config(1, 60_000), gateway);
        f.gateway.set_batch_latency(Duration::from_millis(100));

        f.queue.enqueue_create(users("new", 1)).unwrap();
        f.queue.enqueue_delete(users("old", 1)).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // both kinds ran side by side within one latency window
        assert_eq!(f.gateway.batch_calls().len(), 2);
        f.queue.wait_idle().await;
    }

    #[tokio::test]
    async fn test_successful_flush_invalidates_cached_user() {
        let gateway = InMemoryGateway::new().with_users([UserRecord::new("alice", "daily")]);
        let f = fixture(config(50, 60_000), gateway);
        f.caches
            .user_info
            .set(user_info_key("alice"), UserRecord::new("alice", "daily"), None)
            .await;

        f.queue
            .enqueue_update(vec![UserRecord::new("alice", "weekly")])
            .unwrap();
        f.queue.flush_now().await;

        assert_eq!(f.caches.user_info.get("user_info_alice").await, None);
        assert_eq!(f.gateway.user("alice").unwrap().profile, "weekly");
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_cache() {
        let gateway = InMemoryGateway::new().with_users([UserRecord::new("alice", "daily")]);
        let f = fixture(config(50, 60_000), gateway);
        f.caches
            .user_info
            .set(user_info_key("alice"), UserRecord::new("alice", "daily"), None)
            .await;
        f.gateway.set_unreachable(true);

        f.queue
            .enqueue_update(vec![UserRecord::new("alice", "weekly")])
            .unwrap();
        f.queue.flush_now().await;

        assert!(f.caches.user_info.get("user_info_alice").await.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_closes() {
        let f = fixture(config(50, 60_000), InMemoryGateway::new());

        f.queue.enqueue_create(users("u", 3)).unwrap();
        assert!(f.queue.snapshot().timer_armed);

        let reports = f.queue.shutdown().await;

        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_success());
        assert_eq!(f.gateway.user_count(), 3);
        let snapshot = f.queue.snapshot();
        assert!(snapshot.closed);
        assert!(!snapshot.timer_armed);
        assert!(matches!(
            f.queue.enqueue_create(users("late", 1)),
            Err(ServiceError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let gateway: Arc<dyn DeviceGateway> = Arc::new(InMemoryGateway::new());
        let registry = CacheRegistry::new();
        let caches =
            ReadCaches::from_registry(&registry, &CacheConfig::default(), &ReadTtls::default())
                .unwrap();

        let result = BatchQueue::new(
            config(0, 100),
            gateway,
            Invalidator::new(caches),
            Arc::new(MetricsRecorder::new()),
        );

        assert!(matches!(result, Err(ServiceError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_zero_dead_letter_capacity_is_rejected() {
        let gateway: Arc<dyn DeviceGateway> = Arc::new(InMemoryGateway::new());
        let registry = CacheRegistry::new();
        let caches =
            ReadCaches::from_registry(&registry, &CacheConfig::default(), &ReadTtls::default())
                .unwrap();

        let result = BatchQueue::with_dead_letter_capacity(
            config(50, 100),
            gateway,
            Invalidator::new(caches),
            Arc::new(MetricsRecorder::new()),
            0,
        );

        assert!(matches!(result, Err(ServiceError::Configuration(_))));
    }
}
