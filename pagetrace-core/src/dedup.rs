//! Error fingerprinting and deduplication

use std::collections::HashSet;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::event::StackFrame;

/// Compact content-derived key identifying "the same error"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash event type, message and every frame's (file, line, column)
    pub fn of(error_type: &str, message: &str, frames: &[StackFrame]) -> Self {
        let frames = frames
            .iter()
            .map(|f| format!("{}-{}-{}", f.file_name, f.line_number, f.column_number))
            .collect::<Vec<_>>()
            .join("-");
        let input = format!("{}-{}-{}", error_type, message, frames);

        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of fingerprints seen during the page's lifetime. Never shrinks.
#[derive(Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<Fingerprint>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time a fingerprint is offered, false ever after.
    /// Check and insert are one locked step.
    pub fn should_emit_detail(&self, fingerprint: &Fingerprint) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(fingerprint.clone())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
