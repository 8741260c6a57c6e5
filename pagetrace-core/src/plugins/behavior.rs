//! Behavior tracking plugin
//!
//! Owns the [`BehaviorRing`]. During `load` it records behavior events (and
//! successful API calls, re-tagged as `behavior/request`) and attaches the
//! trace context to errors. Its `transform` suppresses behavior events: they
//! are only ever delivered inside an error's `behaviorList`.
//!
//! The ring starts at the default capacity and is resized to the resolved
//! `behaviorCapacity`, so plugin config patches apply to it.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::behavior::{BehaviorRing, DEFAULT_BEHAVIOR_CAPACITY};
use crate::config::ResolvedConfig;
use crate::error::TrackerResult;
use crate::event::{Category, EnrichedEvent, ErrorEvent, EventKind};
use crate::plugin::{Outcome, Plugin};

pub struct BehaviorPlugin {
    ring: BehaviorRing,
    recording: AtomicBool,
}

impl BehaviorPlugin {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BEHAVIOR_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: BehaviorRing::new(capacity),
            recording: AtomicBool::new(true),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Records currently buffered
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    fn record(&self, event: EnrichedEvent) {
        if self.is_recording() {
            self.ring.record(event);
        }
    }
}

impl Default for BehaviorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for BehaviorPlugin {
    fn name(&self) -> &str {
        "pagetrace-behavior"
    }

    async fn config_resolved(&self, config: &ResolvedConfig) -> TrackerResult<()> {
        self.recording
            .store(config.collectors().behavior, Ordering::SeqCst);
        self.ring.resize(config.settings().behavior_capacity);
        Ok(())
    }

    async fn load(&self, event: &EnrichedEvent) -> TrackerResult<Option<EnrichedEvent>> {
        match &event.event().kind {
            EventKind::Behavior(_) => {
                self.record(event.clone());
                Ok(None)
            }
            EventKind::Api(_) => {
                if let Some(retagged) = event.event().as_behavior_request() {
                    self.record(EnrichedEvent::new(retagged, event.baseline().clone()));
                }
                Ok(None)
            }
            EventKind::Error(ErrorEvent::ResourceError { .. }) => Ok(Some(
                event.clone().with_trace_id(self.ring.current_trace_id()),
            )),
            EventKind::Error(_) => {
                let snapshot = self.ring.drain_and_rotate().await;
                Ok(Some(
                    event
                        .clone()
                        .with_trace_id(snapshot.trace_id)
                        .with_behavior_list(snapshot.records),
                ))
            }
            EventKind::Performance(_) => Ok(None),
        }
    }

    async fn transform(&self, event: &EnrichedEvent) -> TrackerResult<Outcome> {
        if event.category() == Category::Behavior {
            return Ok(Outcome::Suppress);
        }
        Ok(Outcome::NoChange)
    }
}
