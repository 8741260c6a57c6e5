//! Configuration for PageTrace

use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::behavior::DEFAULT_BEHAVIOR_CAPACITY;
use crate::error::{TrackerError, TrackerResult};
use crate::event::{ErrorEvent, Event, EventKind};
use crate::plugin::{Plugin, Stage};
use crate::util::merge_json;

static ENDPOINT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[\w.-]+(:\d+)?(/\S*)?$").expect("static regex"));

/// How reports reach the collector endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    /// Persistent best-effort beacon
    Beacon,
    /// Pixel GET with the payload in the query string
    Img,
    /// JSON POST
    #[default]
    Xhr,
}

/// What happens when a plugin hook fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Log and carry on without that hook's contribution
    #[default]
    Isolate,
    /// Abort the event's traversal (transform faults are still isolated)
    Strict,
}

/// Script error collection options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsErrorOptions {
    /// Whether script errors are collected at all
    pub collect: bool,

    /// Send full detail for every occurrence of the same error
    pub repeat: bool,
}

impl Default for JsErrorOptions {
    fn default() -> Self {
        Self {
            collect: true,
            repeat: true,
        }
    }
}

/// Which categories are collected
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectorOptions {
    pub performance: bool,
    pub api: bool,
    pub js_error: JsErrorOptions,
    pub behavior: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            performance: true,
            api: true,
            js_error: JsErrorOptions::default(),
            behavior: true,
        }
    }
}

/// Configuration supplied by the host page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfig {
    /// Application identifier attached to every report
    pub app_id: String,

    /// Collector URL
    pub endpoint: String,

    /// Delivery strategy
    pub report_mode: ReportMode,

    /// Set to false to collect without sending
    pub send_enabled: bool,

    /// Category switches
    pub collectors: CollectorOptions,

    /// Reported SDK version
    pub sdk_version: String,

    /// Free-form fields attached to every report
    pub extra: Map<String, Value>,

    /// Plugin fault handling
    pub fault_policy: FaultPolicy,

    /// Behavior ring capacity
    pub behavior_capacity: usize,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            endpoint: String::new(),
            report_mode: ReportMode::Xhr,
            send_enabled: true,
            collectors: CollectorOptions::default(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            extra: Map::new(),
            fault_policy: FaultPolicy::Isolate,
            behavior_capacity: DEFAULT_BEHAVIOR_CAPACITY,
        }
    }
}

impl UserConfig {
    pub fn new(app_id: &str, endpoint: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> TrackerResult<Self> {
        serde_json::from_str(json).map_err(|e| TrackerError::Config(e.to_string()))
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> TrackerResult<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Deep-merge a JSON patch over this configuration
    pub fn merged(&self, patch: Value) -> TrackerResult<Self> {
        let mut value = serde_json::to_value(self)?;
        merge_json(&mut value, patch);
        serde_json::from_value(value).map_err(|e| TrackerError::Config(e.to_string()))
    }
}

/// Run every plugin's `config` hook in order, merging each patch
pub async fn apply_plugin_patches(
    mut config: UserConfig,
    plugins: &[Arc<dyn Plugin>],
) -> TrackerResult<UserConfig> {
    for plugin in plugins {
        let patch = match plugin.config(&config).await {
            Ok(patch) => patch,
            Err(error) if config.fault_policy == FaultPolicy::Isolate => {
                tracing::warn!(
                    plugin = plugin.name(),
                    stage = %Stage::Config,
                    "plugin hook failed: {}",
                    error
                );
                None
            }
            Err(error) => {
                return Err(TrackerError::HookFailed {
                    plugin: plugin.name().to_string(),
                    stage: Stage::Config,
                    source: Box::new(error),
                })
            }
        };
        if let Some(patch) = patch {
            if !patch.is_object() {
                tracing::warn!(
                    plugin = plugin.name(),
                    "ignoring config patch that is not an object"
                );
                continue;
            }
            config = config.merged(patch).map_err(|e| {
                TrackerError::Config(format!(
                    "plugin '{}' returned an unusable patch: {}",
                    plugin.name(),
                    e
                ))
            })?;
        }
    }
    Ok(config)
}

/// Patch, validate and freeze the configuration, then let every plugin
/// observe the result. `plugins` is the full pipeline in its final order.
pub async fn resolve_config(
    user: UserConfig,
    plugins: &[Arc<dyn Plugin>],
) -> TrackerResult<ResolvedConfig> {
    let patched = apply_plugin_patches(user, plugins).await?;
    let names = plugins.iter().map(|p| p.name().to_string()).collect();
    let resolved = ResolvedConfig::resolve(patched).with_plugins(names);

    let results = join_all(plugins.iter().map(|p| p.config_resolved(&resolved))).await;
    for (plugin, result) in plugins.iter().zip(results) {
        if let Err(error) = result {
            match resolved.fault_policy() {
                FaultPolicy::Isolate => tracing::warn!(
                    plugin = plugin.name(),
                    stage = %Stage::ConfigResolved,
                    "plugin hook failed: {}",
                    error
                ),
                FaultPolicy::Strict => {
                    return Err(TrackerError::HookFailed {
                        plugin: plugin.name().to_string(),
                        stage: Stage::ConfigResolved,
                        source: Box::new(error),
                    })
                }
            }
        }
    }

    tracing::debug!(
        app_id = %resolved.app_id(),
        delivery = resolved.delivery_enabled(),
        plugins = resolved.plugins().len(),
        "configuration resolved"
    );
    Ok(resolved)
}

/// Final, immutable configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    #[serde(flatten)]
    settings: UserConfig,

    /// False when sending is disabled or the endpoint is unusable
    delivery_enabled: bool,

    /// Plugin names in pipeline order
    plugins: Vec<String>,
}

impl ResolvedConfig {
    /// Validate the endpoint and freeze the settings
    pub fn resolve(settings: UserConfig) -> Self {
        let endpoint_ok = is_valid_endpoint(&settings.endpoint);
        if settings.send_enabled && !endpoint_ok {
            tracing::warn!(
                endpoint = %settings.endpoint,
                "endpoint is invalid, report delivery is disabled"
            );
        }
        let delivery_enabled = settings.send_enabled && endpoint_ok;

        Self {
            settings,
            delivery_enabled,
            plugins: Vec::new(),
        }
    }

    pub(crate) fn with_plugins(mut self, names: Vec<String>) -> Self {
        self.plugins = names;
        self
    }

    pub fn settings(&self) -> &UserConfig {
        &self.settings
    }

    pub fn app_id(&self) -> &str {
        &self.settings.app_id
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    pub fn report_mode(&self) -> ReportMode {
        self.settings.report_mode
    }

    pub fn collectors(&self) -> &CollectorOptions {
        &self.settings.collectors
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.settings.fault_policy
    }

    pub fn delivery_enabled(&self) -> bool {
        self.delivery_enabled
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Whether the category switches let this event in
    pub fn accepts(&self, event: &Event) -> bool {
        let c = &self.settings.collectors;
        match &event.kind {
            EventKind::Performance(_) => c.performance,
            EventKind::Api(_) => c.api,
            EventKind::Behavior(_) => c.behavior,
            EventKind::Error(ErrorEvent::RequestError { .. }) => c.api,
            EventKind::Error(_) => c.js_error.collect,
        }
    }
}

/// `http(s)://host[:port][/path]`
pub fn is_valid_endpoint(endpoint: &str) -> bool {
    ENDPOINT_RE.is_match(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = UserConfig::default();
        assert_eq!(config.report_mode, ReportMode::Xhr);
        assert!(config.send_enabled);
        assert!(config.collectors.js_error.repeat);
        assert_eq!(config.behavior_capacity, 100);
        assert_eq!(config.sdk_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = UserConfig::from_json_str(
            r#"{"appId": "shop", "endpoint": "https://collect.example/r",
                "reportMode": "beacon", "collectors": {"jsError": {"repeat": false}}}"#,
        )
        .unwrap();

        assert_eq!(config.app_id, "shop");
        assert_eq!(config.report_mode, ReportMode::Beacon);
        assert!(config.collectors.js_error.collect);
        assert!(!config.collectors.js_error.repeat);
        assert!(config.collectors.behavior);
    }

    #[test]
    fn test_merged_patch() {
        let config = UserConfig::new("shop", "https://collect.example/r");
        let patched = config
            .merged(json!({"extra": {"release": "1.2"}, "collectors": {"api": false}}))
            .unwrap();

        assert_eq!(patched.app_id, "shop");
        assert_eq!(patched.extra["release"], "1.2");
        assert!(!patched.collectors.api);
        assert!(patched.collectors.performance);
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(is_valid_endpoint("https://collect.example/r"));
        assert!(is_valid_endpoint("http://localhost:8080"));
        assert!(is_valid_endpoint("https://collect.example/r?token=abc"));
        assert!(!is_valid_endpoint(""));
        assert!(!is_valid_endpoint("collect.example/r"));
        assert!(!is_valid_endpoint("ftp://collect.example/r"));
    }

    #[test]
    fn test_invalid_endpoint_disables_delivery() {
        let resolved = ResolvedConfig::resolve(UserConfig::new("shop", "not a url"));
        assert!(!resolved.delivery_enabled());

        let mut settings = UserConfig::new("shop", "https://collect.example/r");
        settings.send_enabled = false;
        assert!(!ResolvedConfig::resolve(settings).delivery_enabled());

        let ok = ResolvedConfig::resolve(UserConfig::new("shop", "https://collect.example/r"));
        assert!(ok.delivery_enabled());
    }

    #[test]
    fn test_accepts_by_category() {
        let mut settings = UserConfig::default();
        settings.collectors.performance = false;
        settings.collectors.js_error.collect = false;
        let resolved = ResolvedConfig::resolve(settings);

        let metric = Event::metric(
            crate::event::Metric {
                name: crate::event::MetricName::Cls,
                rating: crate::event::Rating::Poor,
                value: 0.4,
            },
            "https://shop.example/",
        );
        assert!(!resolved.accepts(&metric));
        assert!(!resolved.accepts(&Event::script_error(
            crate::event::RawError::default(),
            "https://shop.example/"
        )));
        assert!(resolved.accepts(&Event::navigation("/a", "/b")));
    }
}
