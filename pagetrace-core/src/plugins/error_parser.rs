//! Error parsing and deduplication plugin
//!
//! Script errors and unhandled rejections get their stack text parsed into
//! frames and a fingerprint attached. With repeat collection off, only the
//! first occurrence of a fingerprint carries message and frames; later ones
//! are delivered with the fingerprint alone. Resource errors are reduced to
//! the failing element's type and URL.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ResolvedConfig;
use crate::dedup::{Deduplicator, Fingerprint};
use crate::error::TrackerResult;
use crate::event::{
    EnrichedEvent, ErrorDetail, ErrorEvent, EventKind, RawError, ResourceFailure, ResourceTarget,
    StackFrame, TargetType,
};
use crate::plugin::Plugin;

/// `    at fn (file:line:col)` or `    at file:line:col`
static V8_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*at\s+(?:(.+?)\s+\()?(.+?):(\d+):(\d+)\)?\s*$").expect("static regex")
});

/// `fn@file:line:col`, `fn` may be empty
static AT_SIGN_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^@\s]*)@(.+):(\d+):(\d+)\s*$").expect("static regex"));

/// Parse stack text into frames, innermost first. Lines that match neither
/// dialect are skipped.
pub fn parse_stack(stack: &str) -> Vec<StackFrame> {
    stack
        .lines()
        .filter_map(|line| {
            V8_FRAME
                .captures(line)
                .or_else(|| AT_SIGN_FRAME.captures(line))
        })
        .filter_map(|caps| {
            let function_name = caps
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .filter(|name| !name.is_empty());
            Some(StackFrame {
                function_name,
                file_name: caps.get(2)?.as_str().to_string(),
                line_number: caps.get(3)?.as_str().parse().ok()?,
                column_number: caps.get(4)?.as_str().parse().ok()?,
            })
        })
        .collect()
}

/// Describe a failed asset load
pub fn parse_resource_failure(failure: &ResourceFailure) -> ErrorDetail {
    let (target_type, filename) = match failure.element.to_ascii_lowercase().as_str() {
        "script" => (TargetType::Script, failure.src.clone()),
        "img" => (TargetType::Img, failure.src.clone()),
        "link" => (TargetType::Link, failure.href.clone()),
        _ => {
            return ErrorDetail::resource(
                "unknown target".to_string(),
                ResourceTarget::default(),
            )
        }
    };

    ErrorDetail::resource(
        format!("{} not found", target_type.as_str()),
        ResourceTarget {
            target_type,
            filename,
        },
    )
}

pub struct ErrorParserPlugin {
    dedup: Deduplicator,
    repeat: AtomicBool,
}

impl ErrorParserPlugin {
    pub fn new() -> Self {
        Self {
            dedup: Deduplicator::new(),
            repeat: AtomicBool::new(true),
        }
    }

    /// Distinct fingerprints seen so far
    pub fn seen_count(&self) -> usize {
        self.dedup.seen_count()
    }

    fn parse_script_error(&self, event: &EnrichedEvent, error: &RawError) -> EnrichedEvent {
        let frames = parse_stack(&error.stack);
        let fingerprint = Fingerprint::of(event.type_name(), &error.message, &frames);

        let full_detail =
            self.repeat.load(Ordering::SeqCst) || self.dedup.should_emit_detail(&fingerprint);

        let enriched = event.clone().with_fingerprint(fingerprint.as_str());
        if full_detail {
            enriched.with_detail(ErrorDetail::script(&error.message, frames))
        } else {
            tracing::trace!(fingerprint = %fingerprint, "repeated error, detail withheld");
            enriched
        }
    }
}

impl Default for ErrorParserPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ErrorParserPlugin {
    fn name(&self) -> &str {
        "pagetrace-error-parser"
    }

    async fn config_resolved(&self, config: &ResolvedConfig) -> TrackerResult<()> {
        self.repeat
            .store(config.collectors().js_error.repeat, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, event: &EnrichedEvent) -> TrackerResult<Option<EnrichedEvent>> {
        let EventKind::Error(error_event) = &event.event().kind else {
            return Ok(None);
        };

        let enriched = match error_event {
            ErrorEvent::Error { error } | ErrorEvent::UnhandledRejection { error } => {
                self.parse_script_error(event, error)
            }
            ErrorEvent::ResourceError { error } => {
                event.clone().with_detail(parse_resource_failure(error))
            }
            ErrorEvent::RequestError { .. } => return Ok(None),
        };
        Ok(Some(enriched))
    }
}
