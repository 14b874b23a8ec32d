//! Bounded ingress dispatcher.
//!
//! All inbound work funnels through one bounded queue drained by a small
//! worker pool. Items carrying the same serialization key never run
//! concurrently and run in enqueue order: a worker claims the key while it
//! still holds the shared receiver, and a claimed key's later items park
//! in a per-key backlog the owning worker drains in order. Items with
//! different keys interleave freely. Enqueue never blocks: when the queue
//! is full the item is rejected and its drop callback runs instead, so
//! platform handlers stay responsive under load.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use rb_domain::config::DispatcherConfig;

/// Items running longer than this get a warning with their name and key.
const SLOW_ITEM_WARN: Duration = Duration::from_secs(5);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Work item
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One unit of inbound work.
pub struct DispatchItem {
    /// Short label for logs ("route:telegram", "inject").
    pub name: String,
    /// Items sharing a key are mutually exclusive; `None` runs unserialized.
    pub serialize_key: Option<String>,
    /// The work itself. Errors are logged by the worker, never propagated.
    pub work: BoxFuture<'static, anyhow::Result<()>>,
    /// Runs instead of `work` if the queue rejects the item.
    pub on_drop: Option<BoxFuture<'static, ()>>,
    enqueued_at: Instant,
}

impl DispatchItem {
    pub fn new(
        name: impl Into<String>,
        serialize_key: Option<String>,
        work: BoxFuture<'static, anyhow::Result<()>>,
    ) -> Self {
        Self {
            name: name.into(),
            serialize_key,
            work,
            on_drop: None,
            enqueued_at: Instant::now(),
        }
    }

    pub fn with_on_drop(mut self, on_drop: BoxFuture<'static, ()>) -> Self {
        self.on_drop = Some(on_drop);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-key serialization state: whether a worker currently owns the key,
/// and the items dequeued while it did.
#[derive(Default)]
struct KeyState {
    running: bool,
    backlog: VecDeque<DispatchItem>,
}

struct DispatcherInner {
    queue_tx: mpsc::Sender<DispatchItem>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<DispatchItem>>,
    depth: AtomicUsize,
    warn_queue: usize,
    workers: usize,
    started: AtomicBool,
    key_queues: Mutex<HashMap<String, KeyState>>,
}

impl DispatcherInner {
    /// Claim an item's key, or park the item behind the key's current
    /// owner. Called before the shared receiver is released, so claims
    /// land in dequeue order and intra-key FIFO holds.
    fn claim(&self, item: DispatchItem) -> Option<DispatchItem> {
        let Some(key) = item.serialize_key.clone() else {
            return Some(item);
        };
        let mut queues = self.key_queues.lock();
        let state = queues.entry(key).or_default();
        if state.running {
            state.backlog.push_back(item);
            None
        } else {
            state.running = true;
            Some(item)
        }
    }

    /// Hand a finished key back: the next parked item for it, if any,
    /// stays with the same worker; otherwise the key goes idle.
    fn release(&self, key: &str) -> Option<DispatchItem> {
        let mut queues = self.key_queues.lock();
        let state = queues.get_mut(key)?;
        match state.backlog.pop_front() {
            Some(next) => Some(next),
            None => {
                state.running = false;
                None
            }
        }
    }
}

/// The process-wide ingress funnel. Cheap to clone via `Arc`.
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    pub fn new(config: &DispatcherConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.max_queue);
        Self {
            inner: Arc::new(DispatcherInner {
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                depth: AtomicUsize::new(0),
                warn_queue: config.warn_queue,
                workers: config.workers,
                started: AtomicBool::new(false),
                key_queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Build a dispatcher whose workers never start, so enqueued items sit
    /// in the queue. Lets tests exercise backpressure deterministically.
    #[cfg(test)]
    pub fn new_paused(config: &DispatcherConfig) -> Self {
        let dispatcher = Self::new(config);
        dispatcher.inner.started.store(true, Ordering::SeqCst);
        dispatcher
    }

    /// Offer an item to the queue. Returns false (after spawning the
    /// item's drop callback) when the queue is full.
    pub fn enqueue(&self, mut item: DispatchItem) -> bool {
        self.start_workers();
        item.enqueued_at = Instant::now();
        let name = item.name.clone();
        match self.inner.queue_tx.try_send(item) {
            Ok(()) => {
                let depth = self.inner.depth.fetch_add(1, Ordering::Relaxed) + 1;
                // Warn at every multiple of the threshold, not on every
                // enqueue above it.
                if self.inner.warn_queue > 0 && depth % self.inner.warn_queue == 0 {
                    tracing::warn!(depth, item = %name, "dispatch queue backlog is high");
                }
                true
            }
            Err(mpsc::error::TrySendError::Full(rejected)) => {
                tracing::warn!(item = %name, "dispatch queue full, dropping item");
                if let Some(on_drop) = rejected.on_drop {
                    tokio::spawn(on_drop);
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!(item = %name, "dispatch queue closed");
                false
            }
        }
    }

    /// Items currently waiting in the queue.
    pub fn depth(&self) -> usize {
        self.inner.depth.load(Ordering::Relaxed)
    }

    /// Drop per-key entries nobody owns or waits behind. Run periodically
    /// so the key map does not grow with every conversation ever seen.
    pub fn prune_idle_locks(&self) -> usize {
        let mut queues = self.inner.key_queues.lock();
        let before = queues.len();
        queues.retain(|_, state| state.running || !state.backlog.is_empty());
        before - queues.len()
    }

    fn start_workers(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        for worker_id in 0..self.inner.workers {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                worker_loop(inner, worker_id).await;
            });
        }
        tracing::info!(workers = self.inner.workers, "dispatch workers started");
    }
}

impl Clone for EventDispatcher {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

async fn worker_loop(inner: Arc<DispatcherInner>, worker_id: usize) {
    loop {
        let claimed = {
            let mut rx = inner.queue_rx.lock().await;
            let Some(item) = rx.recv().await else {
                break;
            };
            inner.depth.fetch_sub(1, Ordering::Relaxed);
            inner.claim(item)
        };
        // The item went to a claimed key's backlog; its owner runs it.
        let Some(mut item) = claimed else {
            continue;
        };
        loop {
            let key = item.serialize_key.clone();
            run_item(item, worker_id).await;
            match key.and_then(|k| inner.release(&k)) {
                Some(next) => item = next,
                None => break,
            }
        }
    }
}

async fn run_item(item: DispatchItem, worker_id: usize) {
    let queued_for = item.enqueued_at.elapsed();
    let name = item.name;
    let key = item.serialize_key.unwrap_or_default();
    let started = Instant::now();

    // A panicking item must not take its worker down with it.
    match std::panic::AssertUnwindSafe(item.work).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(worker_id, item = %name, key = %key, error = %e, "dispatch item failed");
        }
        Err(_) => {
            tracing::error!(worker_id, item = %name, key = %key, "dispatch item panicked");
        }
    }

    let elapsed = started.elapsed();
    if elapsed >= SLOW_ITEM_WARN {
        tracing::warn!(
            worker_id,
            item = %name,
            key = %key,
            elapsed_ms = elapsed.as_millis() as u64,
            queued_ms = queued_for.as_millis() as u64,
            "slow dispatch item"
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
