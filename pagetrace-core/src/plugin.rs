//! Plugin contract
//!
//! A plugin is a named set of optional hooks. Every hook has a no-op default,
//! so an implementation only overrides the stages it takes part in.
//!
//! | hook              | stage          | contract                                   |
//! |-------------------|----------------|--------------------------------------------|
//! | `config`          | resolution     | return a JSON patch merged into user config |
//! | `config_resolved` | resolution     | observe the final configuration             |
//! | `emit`            | per event      | read-only fan-out, run concurrently         |
//! | `load`            | per event      | sequential, may return a replacement        |
//! | `transform`       | per event      | sequential, first decisive outcome wins     |
//! | `end`             | per event      | delivery side effects, run in order         |

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{ResolvedConfig, UserConfig};
use crate::error::TrackerResult;
use crate::event::{EnrichedEvent, Payload};

/// Pipeline stage, used to label faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    ConfigResolved,
    Emit,
    Load,
    Transform,
    End,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::ConfigResolved => "configResolved",
            Stage::Emit => "emit",
            Stage::Load => "load",
            Stage::Transform => "transform",
            Stage::End => "end",
        };
        f.write_str(name)
    }
}

/// Result of a `transform` hook
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No opinion; the next plugin gets a turn
    NoChange,
    /// This becomes the delivered value; later transforms are skipped
    Replace(Payload),
    /// Drop the event; no `end` hook runs
    Suppress,
}

impl Outcome {
    /// Read a loosely typed hook result: null and the empty string mean no
    /// change, `false` means suppress, anything else replaces.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Outcome::NoChange,
            Value::String(ref s) if s.is_empty() => Outcome::NoChange,
            Value::Bool(false) => Outcome::Suppress,
            other => Outcome::Replace(Payload::Custom(other)),
        }
    }

    pub fn is_decisive(&self) -> bool {
        !matches!(self, Outcome::NoChange)
    }
}

/// Pipeline plugin
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name (for logging)
    fn name(&self) -> &str;

    /// Contribute a configuration patch before resolution
    async fn config(&self, _config: &UserConfig) -> TrackerResult<Option<Value>> {
        Ok(None)
    }

    /// Observe the resolved configuration
    async fn config_resolved(&self, _config: &ResolvedConfig) -> TrackerResult<()> {
        Ok(())
    }

    /// Passive observation of the raw enriched event
    async fn emit(&self, _event: &EnrichedEvent) -> TrackerResult<()> {
        Ok(())
    }

    /// Enrichment; `Some` replaces the event for every later plugin
    async fn load(&self, _event: &EnrichedEvent) -> TrackerResult<Option<EnrichedEvent>> {
        Ok(None)
    }

    /// Decide the delivered value
    async fn transform(&self, _event: &EnrichedEvent) -> TrackerResult<Outcome> {
        Ok(Outcome::NoChange)
    }

    /// Delivery side effects
    async fn end(&self, _payload: &Payload) -> TrackerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_from_value() {
        assert_eq!(Outcome::from_value(Value::Null), Outcome::NoChange);
        assert_eq!(Outcome::from_value(json!("")), Outcome::NoChange);
        assert_eq!(
            Outcome::from_value(json!("  ")),
            Outcome::Replace(Payload::Custom(json!("  ")))
        );
        assert_eq!(Outcome::from_value(json!(false)), Outcome::Suppress);
        assert_eq!(
            Outcome::from_value(json!(true)),
            Outcome::Replace(Payload::Custom(json!(true)))
        );
        assert_eq!(
            Outcome::from_value(json!(0)),
            Outcome::Replace(Payload::Custom(json!(0)))
        );
        assert!(Outcome::from_value(json!({"x": 1})).is_decisive());
    }
}
