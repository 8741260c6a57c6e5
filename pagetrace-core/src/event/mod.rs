//! Event model
//!
//! Every observation a producer hands to the collector is an [`Event`]: a
//! discriminated union keyed by `(category, type)` plus the timestamp and
//! source URL every event carries. The pair fully determines the payload
//! shape, which is why the union is nested per category rather than flat.
//!
//! On the wire an event is a single JSON object:
//!
//! ```json
//! {"category": "performance", "type": "metric",
//!  "metric": {"name": "LCP", "rating": "good", "value": 812.0},
//!  "timeStamp": 1718000000000, "url": "https://shop.example/"}
//! ```
//!
//! Raw error material (`error` fields) is accepted on input but never
//! serialized back out: the error parser turns it into an [`ErrorDetail`]
//! so that withheld detail stays withheld.

mod enriched;
mod error;
mod performance;

pub use enriched::{AgentInfo, Baseline, EnrichedEvent, Payload, ScreenSize};
pub use error::{ErrorDetail, RawError, ResourceFailure, ResourceTarget, StackFrame, TargetType};
pub use performance::{
    resource_snapshot, Metric, MetricName, NavigationTiming, PhaseDurations, Rating, ResourceEntry,
    ResourceTiming,
};

use serde::{Deserialize, Serialize};

/// Top-level event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Performance,
    Error,
    Behavior,
    Api,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Performance => "performance",
            Category::Error => "error",
            Category::Behavior => "behavior",
            Category::Api => "api",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category-tagged payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum EventKind {
    Performance(PerformanceEvent),
    Error(ErrorEvent),
    Behavior(BehaviorEvent),
    Api(ApiEvent),
}

/// Performance samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PerformanceEvent {
    /// One core web vital
    #[serde(rename = "metric")]
    Metric { metric: Metric },

    /// Navigation timing snapshot taken once the page has loaded
    #[serde(rename = "resource")]
    Resource(ResourceTiming),
}

/// Error observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ErrorEvent {
    /// Uncaught script error
    #[serde(rename = "error")]
    Error {
        #[serde(skip_serializing)]
        error: RawError,
    },

    /// Rejected promise nobody handled
    #[serde(rename = "unhandledrejection")]
    UnhandledRejection {
        #[serde(skip_serializing)]
        error: RawError,
    },

    /// Asset that failed to load (script, image, stylesheet)
    #[serde(rename = "resource-error")]
    ResourceError {
        #[serde(skip_serializing)]
        error: ResourceFailure,
    },

    /// Network call that failed or answered with status >= 300
    #[serde(rename = "request-error")]
    RequestError { data: RequestFailure },
}

/// User interaction and navigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BehaviorEvent {
    #[serde(rename = "navigation")]
    Navigation { data: NavigationData },

    #[serde(rename = "ui-click")]
    UiClick { data: ClickData },

    #[serde(rename = "request")]
    Request { data: RequestData },
}

/// Successful network calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApiEvent {
    #[serde(rename = "request")]
    Request { data: RequestData },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationData {
    pub from: String,
    pub to: String,
}

/// One element on the path from the document root to the clicked node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClickData {
    /// Ancestors first, clicked element last
    #[serde(default)]
    pub path: Vec<ElementNode>,

    /// Rendered selector chain, filled by the element parser
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceEntry>,
    pub status: i32,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub content_length: u64,
    pub method: String,
    #[serde(default)]
    pub params: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceEntry>,
    pub status: i32,
    #[serde(default)]
    pub status_text: String,
    pub method: String,
    #[serde(default)]
    pub params: String,
}

/// A raw observation handed in by a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,

    /// Wall clock, epoch milliseconds
    #[serde(rename = "timeStamp")]
    pub timestamp: i64,

    /// Page URL at the time of observation
    pub url: String,
}

impl Event {
    /// Create an event stamped with the current time
    pub fn new(kind: EventKind, url: impl Into<String>) -> Self {
        Self::at(kind, url, crate::util::now_millis())
    }

    /// Create an event with an explicit timestamp
    pub fn at(kind: EventKind, url: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind,
            timestamp,
            url: url.into(),
        }
    }

    pub fn metric(metric: Metric, url: impl Into<String>) -> Self {
        Self::new(
            EventKind::Performance(PerformanceEvent::Metric { metric }),
            url,
        )
    }

    pub fn navigation(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let data = NavigationData {
            from: from.clone(),
            to: to.into(),
        };
        Self::new(EventKind::Behavior(BehaviorEvent::Navigation { data }), from)
    }

    pub fn click(path: Vec<ElementNode>, url: impl Into<String>) -> Self {
        let data = ClickData {
            path,
            chain: String::new(),
        };
        Self::new(EventKind::Behavior(BehaviorEvent::UiClick { data }), url)
    }

    pub fn script_error(error: RawError, url: impl Into<String>) -> Self {
        Self::new(EventKind::Error(ErrorEvent::Error { error }), url)
    }

    pub fn unhandled_rejection(error: RawError, url: impl Into<String>) -> Self {
        Self::new(
            EventKind::Error(ErrorEvent::UnhandledRejection { error }),
            url,
        )
    }

    pub fn resource_error(error: ResourceFailure, url: impl Into<String>) -> Self {
        Self::new(EventKind::Error(ErrorEvent::ResourceError { error }), url)
    }

    pub fn category(&self) -> Category {
        match self.kind {
            EventKind::Performance(_) => Category::Performance,
            EventKind::Error(_) => Category::Error,
            EventKind::Behavior(_) => Category::Behavior,
            EventKind::Api(_) => Category::Api,
        }
    }

    /// The `type` discriminator within the category
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            EventKind::Performance(PerformanceEvent::Metric { .. }) => "metric",
            EventKind::Performance(PerformanceEvent::Resource(_)) => "resource",
            EventKind::Error(ErrorEvent::Error { .. }) => "error",
            EventKind::Error(ErrorEvent::UnhandledRejection { .. }) => "unhandledrejection",
            EventKind::Error(ErrorEvent::ResourceError { .. }) => "resource-error",
            EventKind::Error(ErrorEvent::RequestError { .. }) => "request-error",
            EventKind::Behavior(BehaviorEvent::Navigation { .. }) => "navigation",
            EventKind::Behavior(BehaviorEvent::UiClick { .. }) => "ui-click",
            EventKind::Behavior(BehaviorEvent::Request { .. }) => "request",
            EventKind::Api(ApiEvent::Request { .. }) => "request",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, EventKind::Error(_))
    }

    pub fn is_behavior(&self) -> bool {
        matches!(self.kind, EventKind::Behavior(_))
    }

    /// An `api/request` re-tagged as `behavior/request`; `None` for anything else
    pub fn as_behavior_request(&self) -> Option<Event> {
        match &self.kind {
            EventKind::Api(ApiEvent::Request { data }) => Some(Event {
                kind: EventKind::Behavior(BehaviorEvent::Request { data: data.clone() }),
                timestamp: self.timestamp,
                url: self.url.clone(),
            }),
            _ => None,
        }
    }
}
