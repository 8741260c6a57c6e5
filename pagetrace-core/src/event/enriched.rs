//! Enriched events and delivery payloads

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Category, ErrorDetail, Event};
use crate::behavior::BehaviorRecord;

/// Device and browser summary supplied by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub browser: String,
    pub version: String,
    pub os: String,
    pub os_version: String,
    /// `mobile` or `pc`
    pub device: String,
    pub user_agent: String,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            browser: "unknown".to_string(),
            version: "unknown".to_string(),
            os: "unknown os".to_string(),
            os_version: "unknown version".to_string(),
            device: "pc".to_string(),
            user_agent: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Fields attached once at intake
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    /// Anonymous page-visit id, rotated at the ready transition
    pub page_id: String,
    pub agent_info: AgentInfo,
    pub screen_width: u32,
    pub screen_height: u32,
    pub sdk_version: String,
    pub app_id: String,
    pub previous_url: String,
    /// Per browser session
    pub session_id: String,
    /// Per calendar day
    pub visitor_id: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// An [`Event`] plus baseline fields and whatever enrichment `load` added.
///
/// The base event and baseline are fixed at construction. Enrichment goes
/// through the consuming `with_*` methods, so each plugin hands the next one
/// a new record rather than mutating a shared one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    event: Event,

    #[serde(flatten)]
    baseline: Baseline,

    #[serde(rename = "traceId", skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,

    #[serde(rename = "behaviorList", skip_serializing_if = "Option::is_none")]
    behavior_list: Option<Vec<BehaviorRecord>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,

    #[serde(flatten)]
    detail: Option<ErrorDetail>,

    /// Integrator-supplied fields
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl EnrichedEvent {
    pub fn new(event: Event, baseline: Baseline) -> Self {
        Self {
            event,
            baseline,
            trace_id: None,
            behavior_list: None,
            fingerprint: None,
            detail: None,
            fields: Map::new(),
        }
    }

    /// Wrap an event with an empty baseline
    pub fn bare(event: Event) -> Self {
        Self::new(event, Baseline::default())
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn category(&self) -> Category {
        self.event.category()
    }

    pub fn type_name(&self) -> &'static str {
        self.event.type_name()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn behavior_list(&self) -> Option<&[BehaviorRecord]> {
        self.behavior_list.as_deref()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn detail(&self) -> Option<&ErrorDetail> {
        self.detail.as_ref()
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_behavior_list(mut self, records: Vec<BehaviorRecord>) -> Self {
        self.behavior_list = Some(records);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Replace the base event, keeping baseline and enrichment.
    ///
    /// Only payload refinements are allowed: the `(category, type)` pair
    /// must stay the same, otherwise the record is returned unchanged.
    pub fn with_event(mut self, event: Event) -> Self {
        if event.category() == self.event.category() && event.type_name() == self.event.type_name()
        {
            self.event = event;
        }
        self
    }

    /// Attach an integrator field; reserved names are refused
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !RESERVED_FIELDS.contains(&key.as_str()) {
            self.fields.insert(key, value);
        }
        self
    }
}

const RESERVED_FIELDS: &[&str] = &[
    "category",
    "type",
    "timeStamp",
    "url",
    "traceId",
    "behaviorList",
    "fingerprint",
    "message",
    "stackFrames",
    "target",
    "pageId",
    "agentInfo",
    "screenWidth",
    "screenHeight",
    "sdkVersion",
    "appId",
    "previousUrl",
    "sessionId",
    "visitorId",
    "extra",
];

/// What finally reaches the `end` stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// The enriched event itself
    Event(Box<EnrichedEvent>),
    /// A value produced by a transform hook
    Custom(Value),
}

impl Payload {
    pub fn as_event(&self) -> Option<&EnrichedEvent> {
        match self {
            Payload::Event(event) => Some(event),
            Payload::Custom(_) => None,
        }
    }
}

impl From<EnrichedEvent> for Payload {
    fn from(event: EnrichedEvent) -> Self {
        Payload::Event(Box::new(event))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Custom(value)
    }
}
