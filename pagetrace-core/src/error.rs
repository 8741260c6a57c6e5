//! Error types for PageTrace

use thiserror::Error;

use crate::plugin::Stage;

/// Result type for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Errors that can occur in the tracker
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Configuration could not be resolved
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A tracker was built outside of a tokio runtime
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    /// A plugin hook reported a fault
    #[error("Plugin '{plugin}' failed: {reason}")]
    Plugin { plugin: String, reason: String },

    /// A hook fault escalated under the strict fault policy
    #[error("Plugin '{plugin}' aborted the {stage} stage: {source}")]
    HookFailed {
        plugin: String,
        stage: Stage,
        #[source]
        source: Box<TrackerError>,
    },

    /// Identity store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Build a plugin fault from any displayable reason
    pub fn plugin(plugin: &str, reason: impl std::fmt::Display) -> Self {
        Self::Plugin {
            plugin: plugin.to_string(),
            reason: reason.to_string(),
        }
    }
}
