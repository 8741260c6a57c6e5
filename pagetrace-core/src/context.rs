//! Page context and baseline fields

use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

use crate::event::{AgentInfo, Baseline, BehaviorEvent, Event, EventKind, ScreenSize};
use crate::identity::Identity;
use crate::util::random_mark;

/// Device facts supplied by the embedding host
pub trait HostInfo: Send + Sync {
    fn agent(&self) -> AgentInfo;

    fn screen(&self) -> ScreenSize;
}

/// Fixed host description
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub agent: AgentInfo,
    pub screen: ScreenSize,
}

impl StaticHost {
    pub fn new(agent: AgentInfo, screen: ScreenSize) -> Self {
        Self { agent, screen }
    }
}

impl HostInfo for StaticHost {
    fn agent(&self) -> AgentInfo {
        self.agent.clone()
    }

    fn screen(&self) -> ScreenSize {
        self.screen
    }
}

/// Per-tracker page state
pub struct PageContext {
    page_id: Mutex<String>,
    previous_url: Mutex<String>,
    host: Arc<dyn HostInfo>,
    identity: Identity,
    app_id: String,
    sdk_version: String,
    extra: Map<String, Value>,
}

impl PageContext {
    pub fn new(
        host: Arc<dyn HostInfo>,
        identity: Identity,
        app_id: &str,
        sdk_version: &str,
        extra: Map<String, Value>,
    ) -> Self {
        Self {
            page_id: Mutex::new(random_mark()),
            previous_url: Mutex::new(String::new()),
            host,
            identity,
            app_id: app_id.to_string(),
            sdk_version: sdk_version.to_string(),
            extra,
        }
    }

    pub fn page_id(&self) -> String {
        self.page_id.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Start a new page visit; returns the new id
    pub fn rotate_page_id(&self) -> String {
        let id = random_mark();
        *self.page_id.lock().unwrap_or_else(|e| e.into_inner()) = id.clone();
        id
    }

    pub fn previous_url(&self) -> String {
        self.previous_url
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Track navigation so later events know where the user came from
    pub fn observe(&self, event: &Event) {
        if let EventKind::Behavior(BehaviorEvent::Navigation { data }) = &event.kind {
            *self.previous_url.lock().unwrap_or_else(|e| e.into_inner()) = data.from.clone();
        }
    }

    /// Baseline fields for an event collected now
    pub fn baseline(&self) -> Baseline {
        let screen = self.host.screen();
        Baseline {
            page_id: self.page_id(),
            agent_info: self.host.agent(),
            screen_width: screen.width,
            screen_height: screen.height,
            sdk_version: self.sdk_version.clone(),
            app_id: self.app_id.clone(),
            previous_url: self.previous_url(),
            session_id: self.identity.session_id(),
            visitor_id: self.identity.visitor_id(),
            extra: self.extra.clone(),
        }
    }
}
