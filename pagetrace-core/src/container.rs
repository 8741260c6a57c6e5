//! Pipeline container
//!
//! Drives one event through the ordered plugin list:
//!
//! ```text
//! emit (fan-out, concurrent) ─► load (sequential, replacing)
//!        ─► transform (sequential, first decisive wins) ─► end (in order)
//! ```
//!
//! The plugin list is fixed at construction. Order matters for `load` and
//! `transform`: later plugins see earlier plugins' enrichment, and the
//! first decisive transform ends the stage.

use std::sync::Arc;

use futures::future::join_all;

use crate::config::FaultPolicy;
use crate::error::{TrackerError, TrackerResult};
use crate::event::{EnrichedEvent, Payload};
use crate::plugin::{Outcome, Plugin, Stage};

/// What the transform stage decided
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Deliver this value through `end`
    Deliver(Payload),
    /// A transform returned [`Outcome::Suppress`]
    Suppressed,
}

/// Ordered, immutable plugin pipeline
pub struct PluginContainer {
    plugins: Vec<Arc<dyn Plugin>>,
    fault_policy: FaultPolicy,
}

impl PluginContainer {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>, fault_policy: FaultPolicy) -> Self {
        Self {
            plugins,
            fault_policy,
        }
    }

    pub fn plugins(&self) -> &[Arc<dyn Plugin>] {
        &self.plugins
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }

    /// Log an isolated fault, or escalate it under the strict policy
    fn absorb(&self, plugin: &dyn Plugin, stage: Stage, error: TrackerError) -> TrackerResult<()> {
        match self.fault_policy {
            FaultPolicy::Isolate => {
                tracing::warn!(plugin = plugin.name(), %stage, "plugin hook failed: {}", error);
                Ok(())
            }
            FaultPolicy::Strict => Err(TrackerError::HookFailed {
                plugin: plugin.name().to_string(),
                stage,
                source: Box::new(error),
            }),
        }
    }

    /// Notify every plugin concurrently; results are ignored apart from faults
    pub async fn emit(&self, event: &EnrichedEvent) -> TrackerResult<()> {
        let results = join_all(self.plugins.iter().map(|p| p.emit(event))).await;
        for (plugin, result) in self.plugins.iter().zip(results) {
            if let Err(error) = result {
                self.absorb(plugin.as_ref(), Stage::Emit, error)?;
            }
        }
        Ok(())
    }

    /// Visit plugins in order, threading each replacement into the next
    pub async fn load(&self, mut event: EnrichedEvent) -> TrackerResult<EnrichedEvent> {
        for plugin in &self.plugins {
            match plugin.load(&event).await {
                Ok(Some(replacement)) => event = replacement,
                Ok(None) => {}
                Err(error) => self.absorb(plugin.as_ref(), Stage::Load, error)?,
            }
        }
        Ok(event)
    }

    /// First decisive outcome wins. Faults here are always isolated.
    pub async fn transform(&self, event: EnrichedEvent) -> Delivery {
        for plugin in &self.plugins {
            match plugin.transform(&event).await {
                Ok(Outcome::NoChange) => {}
                Ok(Outcome::Replace(payload)) => return Delivery::Deliver(payload),
                Ok(Outcome::Suppress) => return Delivery::Suppressed,
                Err(error) => {
                    tracing::warn!(
                        plugin = plugin.name(),
                        stage = %Stage::Transform,
                        "transform failed, treating as no change: {}",
                        error
                    );
                }
            }
        }
        Delivery::Deliver(Payload::from(event))
    }

    /// Run every `end` hook in order
    pub async fn end(&self, payload: &Payload) -> TrackerResult<()> {
        for plugin in &self.plugins {
            if let Err(error) = plugin.end(payload).await {
                self.absorb(plugin.as_ref(), Stage::End, error)?;
            }
        }
        Ok(())
    }

    /// Full traversal for one event
    pub async fn run(&self, event: EnrichedEvent) -> TrackerResult<Delivery> {
        self.emit(&event).await?;
        let event = self.load(event).await?;
        let delivery = self.transform(event).await;
        if let Delivery::Deliver(payload) = &delivery {
            self.end(payload).await?;
        }
        Ok(delivery)
    }
}
