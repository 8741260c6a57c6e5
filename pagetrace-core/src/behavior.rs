//! Behavior ring buffer and trace correlation
//!
//! Recent interaction, navigation and request events are kept in a bounded
//! FIFO. When an error arrives the buffer is drained into the error's
//! `behaviorList` and a fresh trace id starts, so every error carries
//! "everything since the previous error" as causal context.
//!
//! ```text
//! record() ──► [ b1 b2 ... b100 ] ──drain_and_rotate()──► (trace_id, [b1..b100])
//!                 oldest evicted                             new trace id begins
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::event::EnrichedEvent;
use crate::util::{new_trace_id, now_millis};

/// Default ring capacity
pub const DEFAULT_BEHAVIOR_CAPACITY: usize = 100;

/// A behavior event as stored in the ring
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorRecord {
    #[serde(flatten)]
    pub event: EnrichedEvent,

    /// Trace id active when the record was inserted
    #[serde(rename = "traceId")]
    pub trace_id: String,

    /// Insertion time, epoch millis
    #[serde(rename = "recordedAt")]
    pub recorded_at: i64,
}

/// What a drain hands back
#[derive(Debug, Clone)]
pub struct BehaviorSnapshot {
    /// Trace id that was active at drain time
    pub trace_id: String,
    /// Oldest first
    pub records: Vec<BehaviorRecord>,
}

struct RingState {
    records: VecDeque<BehaviorRecord>,
    trace_id: String,
    evicted: u64,
}

/// Bounded FIFO of recent behavior events
pub struct BehaviorRing {
    capacity: AtomicUsize,
    state: Mutex<RingState>,
}

impl BehaviorRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity: AtomicUsize::new(capacity),
            state: Mutex::new(RingState {
                records: VecDeque::with_capacity(capacity),
                trace_id: new_trace_id(),
                evicted: 0,
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push a behavior event, evicting the oldest when full
    pub fn record(&self, event: EnrichedEvent) {
        let mut state = self.state();
        let capacity = self.capacity();
        while state.records.len() >= capacity {
            state.records.pop_front();
            state.evicted += 1;
        }
        let trace_id = state.trace_id.clone();
        state.records.push_back(BehaviorRecord {
            event,
            trace_id,
            recorded_at: now_millis(),
        });
    }

    /// Yield once so same-tick records land, then take everything and
    /// start a new trace.
    ///
    /// The take and the rotation happen under one lock: two errors draining
    /// back to back each get a disjoint slice and distinct trace ids.
    pub async fn drain_and_rotate(&self) -> BehaviorSnapshot {
        tokio::task::yield_now().await;

        let mut state = self.state();
        let records: Vec<BehaviorRecord> = state.records.drain(..).collect();
        let trace_id = std::mem::replace(&mut state.trace_id, new_trace_id());
        BehaviorSnapshot { trace_id, records }
    }

    pub fn current_trace_id(&self) -> String {
        self.state().trace_id.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    /// Change the capacity, evicting the oldest records that no longer fit
    pub fn resize(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let mut state = self.state();
        self.capacity.store(capacity, Ordering::SeqCst);
        while state.records.len() > capacity {
            state.records.pop_front();
            state.evicted += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    /// Records dropped to make room since creation
    pub fn evicted(&self) -> u64 {
        self.state().evicted
    }
}

impl Default for BehaviorRing {
    fn default() -> Self {
        Self::new(DEFAULT_BEHAVIOR_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BehaviorEvent, Event, EventKind};

    fn nav(i: usize) -> EnrichedEvent {
        EnrichedEvent::bare(Event::navigation(format!("/p{}", i), format!("/p{}", i + 1)))
    }

    fn destination(record: &BehaviorRecord) -> String {
        match &record.event.event().kind {
            EventKind::Behavior(BehaviorEvent::Navigation { data }) => data.to.clone(),
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drain_returns_last_hundred_in_order() {
        let ring = BehaviorRing::new(100);
        for i in 0..105 {
            ring.record(nav(i));
        }
        assert_eq!(ring.len(), 100);
        assert_eq!(ring.evicted(), 5);

        let snapshot = ring.drain_and_rotate().await;
        assert_eq!(snapshot.records.len(), 100);
        assert_eq!(destination(&snapshot.records[0]), "/p6");
        assert_eq!(destination(&snapshot.records[99]), "/p105");
        assert!(ring.is_empty());
    }

    #[tokio::test]
    async fn test_drain_rotates_trace_id() {
        let ring = BehaviorRing::default();
        let first = ring.current_trace_id();
        ring.record(nav(0));

        let snapshot = ring.drain_and_rotate().await;
        assert_eq!(snapshot.trace_id, first);
        assert_eq!(snapshot.records[0].trace_id, first);
        assert_ne!(ring.current_trace_id(), first);

        ring.record(nav(1));
        let next = ring.drain_and_rotate().await;
        assert_ne!(next.trace_id, first);
        assert_eq!(next.records.len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_independent() {
        let ring = BehaviorRing::default();
        ring.record(nav(0));
        let snapshot = ring.drain_and_rotate().await;

        ring.record(nav(1));
        ring.record(nav(2));
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(ring.len(), 2);
    }
}
