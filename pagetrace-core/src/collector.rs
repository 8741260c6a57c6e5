//! Collector: the ingestion entry point
//!
//! `collect()` is fire-and-forget. Until the page is ready every event is
//! cached in arrival order; the ready transition replays the cache and from
//! then on events are dispatched immediately. Dispatch attaches the baseline
//! fields and hands the event to the dispatcher.
//!
//! ```text
//! collect ──► gate ──(not ready)──► cache ──mark_ready()──┐
//!               │                                          ▼
//!               └──────(ready)──────────────────────► dispatch ──► mpsc ──► dispatcher
//! ```
//!
//! Both the replay and live dispatch happen while the gate lock is held, so
//! nothing collected after the transition can be queued ahead of a cached
//! event.
//!
//! The dispatcher is a single task that drives every traversal as one
//! future in a `FuturesUnordered`. Traversals interleave at their `.await`
//! points but never run in parallel, whatever the runtime flavor, and new
//! traversals are first polled in submission order. A traversal that never
//! suspends therefore reaches `end` in submission order.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};

use crate::config::ResolvedConfig;
use crate::container::PluginContainer;
use crate::context::PageContext;
use crate::error::{TrackerError, TrackerResult};
use crate::event::{EnrichedEvent, Event};

struct Gate {
    ready: bool,
    cache: VecDeque<Event>,
}

/// One accepted event on its way through the pipeline
struct Traversal {
    event: EnrichedEvent,
    guard: InFlight,
}

/// Event intake with the readiness gate
pub struct Collector {
    config: Arc<ResolvedConfig>,
    context: Arc<PageContext>,
    gate: Mutex<Gate>,
    dispatch_tx: mpsc::UnboundedSender<Traversal>,
    in_flight: Arc<InFlightCounter>,
}

impl Collector {
    /// Bind to the calling tokio runtime and start the dispatcher
    pub fn new(
        container: Arc<PluginContainer>,
        config: Arc<ResolvedConfig>,
        context: Arc<PageContext>,
    ) -> TrackerResult<Self> {
        let handle = Handle::try_current().map_err(|e| TrackerError::NoRuntime(e.to_string()))?;
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        handle.spawn(drive(container, dispatch_rx));

        Ok(Self {
            config,
            context,
            gate: Mutex::new(Gate {
                ready: false,
                cache: VecDeque::new(),
            }),
            dispatch_tx,
            in_flight: Arc::new(InFlightCounter::default()),
        })
    }

    fn gate(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Accept an event. Never fails and never blocks on delivery.
    pub fn collect(&self, event: Event) {
        if !self.config.accepts(&event) {
            tracing::debug!(
                category = %event.category(),
                kind = event.type_name(),
                "category disabled, event dropped"
            );
            return;
        }

        let mut gate = self.gate();
        if gate.ready {
            self.dispatch(event);
        } else {
            gate.cache.push_back(event);
        }
    }

    /// One-way transition to live dispatch. Yields once first so that
    /// events collected in the same tick are cached, then rotates the page
    /// id and replays the cache in arrival order. Later calls are no-ops.
    pub async fn mark_ready(&self) {
        tokio::task::yield_now().await;

        let mut gate = self.gate();
        if gate.ready {
            return;
        }
        gate.ready = true;
        let page_id = self.context.rotate_page_id();

        let cached = std::mem::take(&mut gate.cache);
        tracing::debug!(page_id = %page_id, cached = cached.len(), "page ready, replaying cache");
        for event in cached {
            self.dispatch(event);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.gate().ready
    }

    /// Events waiting for the ready transition
    pub fn cached_len(&self) -> usize {
        self.gate().cache.len()
    }

    /// Traversals dispatched but not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Resolve once no traversal is in flight
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check, so a drop to zero in between
            // still wakes this waiter
            let idle = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            idle.await;
        }
    }

    fn dispatch(&self, event: Event) {
        self.context.observe(&event);
        let traversal = Traversal {
            event: EnrichedEvent::new(event, self.context.baseline()),
            guard: InFlight::enter(&self.in_flight),
        };

        if let Err(mpsc::error::SendError(lost)) = self.dispatch_tx.send(traversal) {
            tracing::warn!(
                category = %lost.event.category(),
                kind = lost.event.type_name(),
                "dispatcher stopped, event dropped"
            );
        }
    }
}

/// Drive every traversal from one task, in submission order
async fn drive(container: Arc<PluginContainer>, mut rx: mpsc::UnboundedReceiver<Traversal>) {
    let mut running = FuturesUnordered::new();
    loop {
        tokio::select! {
            biased;
            Some(traversal) = rx.recv() => {
                running.push(traverse(Arc::clone(&container), traversal));
            }
            Some(()) = running.next(), if !running.is_empty() => {}
            else => break,
        }
    }
    tracing::debug!("dispatcher stopped");
}

async fn traverse(container: Arc<PluginContainer>, traversal: Traversal) {
    let Traversal { event, guard } = traversal;
    let category = event.category();
    let type_name = event.type_name();

    match AssertUnwindSafe(container.run(event)).catch_unwind().await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::warn!(
                category = %category,
                kind = type_name,
                "event traversal aborted: {}",
                e
            );
        }
        Err(_) => {
            tracing::warn!(category = %category, kind = type_name, "event traversal panicked");
        }
    }
    drop(guard);
}

#[derive(Default)]
struct InFlightCounter {
    count: AtomicUsize,
    idle: Notify,
}

/// Counts a traversal until dropped, even if it panics
struct InFlight(Arc<InFlightCounter>);

impl InFlight {
    fn enter(counter: &Arc<InFlightCounter>) -> Self {
        counter.count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}
