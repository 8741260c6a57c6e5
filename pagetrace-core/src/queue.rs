//! Batching transport queue
//!
//! Delivery tasks are coalesced into batches. The first enqueue of a window
//! schedules exactly one flush on the deferred executor; later enqueues in
//! the same window just append. A flush snapshots and clears the pending
//! list before running anything, so a task that enqueues another task feeds
//! the next batch, never the current one.
//!
//! Flushes never overlap: a flush holds the run lock from snapshot to the
//! last task, so batches reach the channel in enqueue order even when the
//! executor runs jobs on several worker threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::DeferredExecutor;

/// A zero-argument delivery task
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Tasks waiting for the next flush
    pub pending_count: usize,

    /// Total tasks enqueued
    pub total_enqueued: u64,

    /// Total tasks executed
    pub total_executed: u64,

    /// Number of flushes that ran at least one task
    pub flush_count: u64,

    /// Last flush time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_flush_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct QueueState {
    tasks: Vec<Task>,
    /// A flush is scheduled and has not started yet
    scheduled: bool,
    last_flush_at: Option<DateTime<Utc>>,
}

/// Batching transport queue
pub struct BatchQueue {
    executor: Arc<dyn DeferredExecutor>,
    state: Mutex<QueueState>,
    running: Mutex<()>,
    total_enqueued: AtomicU64,
    total_executed: AtomicU64,
    flush_count: AtomicU64,
}

impl BatchQueue {
    pub fn new(executor: Arc<dyn DeferredExecutor>) -> Arc<Self> {
        Arc::new(Self {
            executor,
            state: Mutex::new(QueueState::default()),
            running: Mutex::new(()),
            total_enqueued: AtomicU64::new(0),
            total_executed: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a task, scheduling a flush if none is pending
    pub fn enqueue(self: &Arc<Self>, task: Task) {
        let schedule = {
            let mut state = self.state();
            state.tasks.push(task);
            !std::mem::replace(&mut state.scheduled, true)
        };
        self.total_enqueued.fetch_add(1, Ordering::SeqCst);

        if schedule {
            tracing::trace!(executor = self.executor.name(), "scheduling flush");
            let queue = Arc::clone(self);
            self.executor.defer(Box::new(move || {
                queue.flush();
            }));
        }
    }

    /// Run every task pending right now, in FIFO order.
    ///
    /// Panics inside a task are not caught here; delivery adapters are
    /// expected to contain their own failures. A task must not call
    /// `flush` itself.
    pub fn flush(&self) -> usize {
        let _running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let batch = {
            let mut state = self.state();
            state.scheduled = false;
            if !state.tasks.is_empty() {
                state.last_flush_at = Some(Utc::now());
            }
            std::mem::take(&mut state.tasks)
        };

        let count = batch.len();
        if count == 0 {
            return 0;
        }

        tracing::debug!(tasks = count, "flushing delivery batch");
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        for task in batch {
            task();
            self.total_executed.fetch_add(1, Ordering::SeqCst);
        }
        count
    }

    /// Drop pending tasks without running them
    pub fn clear(&self) -> usize {
        let mut state = self.state();
        let dropped = state.tasks.len();
        state.tasks.clear();
        dropped
    }

    pub fn pending_len(&self) -> usize {
        self.state().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().tasks.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        let (pending_count, last_flush_at) = {
            let state = self.state();
            (state.tasks.len(), state.last_flush_at)
        };

        QueueStats {
            pending_count,
            total_enqueued: self.total_enqueued.load(Ordering::SeqCst),
            total_executed: self.total_executed.load(Ordering::SeqCst),
            flush_count: self.flush_count.load(Ordering::SeqCst),
            last_flush_at,
        }
    }
}
