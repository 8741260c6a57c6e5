//! PageTrace Core - client-side telemetry pipeline
//!
//! Producers hand observations (web vitals, script errors, clicks, network
//! calls) to a [`Tracker`]. Each event is enriched with page and visitor
//! baseline fields, run through an ordered plugin pipeline and, unless a
//! plugin suppresses it, delivered in batches to a collector endpoint.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         TRACKER                              │
//! │                                                              │
//! │   collect(event)                                             │
//! │        │                                                     │
//! │   ┌────▼──────┐  cache until ready   ┌──────────────┐        │
//! │   │ Collector ├─────────────────────►│ PageContext  │        │
//! │   └────┬──────┘  baseline fields     └──────────────┘        │
//! │        │ ordered dispatcher                                  │
//! │   ┌────▼──────────────────────────────────────────────┐      │
//! │   │ PluginContainer: emit ► load ► transform ► end    │      │
//! │   │  element │ behavior │ error parser │ user │ report│      │
//! │   └─────────────────────────────────────────┬─────────┘      │
//! │                                             │                │
//! │                      ┌──────────────────────▼─────┐          │
//! │                      │ BatchQueue ► Transport     │          │
//! │                      │   beacon │ pixel │ JSON POST│          │
//! │                      └────────────────────────────┘          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pagetrace_core::{Event, RawError, Tracker, UserConfig};
//!
//! let tracker = Tracker::builder(UserConfig::new("shop", "https://collect.example/r"))
//!     .build()
//!     .await?;
//!
//! tracker.collect(Event::script_error(
//!     RawError::new("TypeError", "x is undefined", stack),
//!     "https://shop.example/cart",
//! ));
//!
//! // Once the page has loaded
//! tracker.page_ready().await;
//! ```

pub mod behavior;
pub mod collector;
pub mod config;
pub mod container;
pub mod context;
pub mod dedup;
pub mod error;
pub mod event;
pub mod executor;
pub mod identity;
pub mod plugin;
pub mod plugins;
pub mod queue;
pub mod transport;
pub mod util;

pub use behavior::{BehaviorRecord, BehaviorRing, BehaviorSnapshot};
pub use collector::Collector;
pub use config::{
    resolve_config, CollectorOptions, FaultPolicy, JsErrorOptions, ReportMode, ResolvedConfig,
    UserConfig,
};
pub use container::{Delivery, PluginContainer};
pub use context::{HostInfo, PageContext, StaticHost};
pub use dedup::{Deduplicator, Fingerprint};
pub use error::{TrackerError, TrackerResult};
pub use event::{
    AgentInfo, Baseline, Category, EnrichedEvent, ErrorDetail, Event, EventKind, Metric,
    MetricName, Payload, RawError, Rating, ResourceFailure, ScreenSize, StackFrame,
};
pub use executor::{
    default_executor, DeferredExecutor, ManualExecutor, ThreadTimerExecutor, TokioIdleExecutor,
};
pub use identity::{Identity, IdentityStore, MemoryStore, StoreScope};
pub use plugin::{Outcome, Plugin, Stage};
pub use queue::{BatchQueue, QueueStats};
pub use transport::{DeliveryChannel, MemoryChannel, NullChannel, SendHook, Transport};

use std::sync::Arc;

use tokio::runtime::Handle;

/// Builder for [`Tracker`]
pub struct TrackerBuilder {
    config: UserConfig,
    plugins: Vec<Arc<dyn Plugin>>,
    host: Option<Arc<dyn HostInfo>>,
    store: Option<Arc<dyn IdentityStore>>,
    channel: Option<Arc<dyn DeliveryChannel>>,
    send_hook: Option<SendHook>,
    executor: Option<Arc<dyn DeferredExecutor>>,
}

impl TrackerBuilder {
    pub fn new(config: UserConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
            host: None,
            store: None,
            channel: None,
            send_hook: None,
            executor: None,
        }
    }

    /// Append an integrator plugin; runs after the built-ins, before delivery
    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_host(mut self, host: Arc<dyn HostInfo>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Replace channel delivery with a callback
    pub fn with_send_hook(mut self, hook: SendHook) -> Self {
        self.send_hook = Some(hook);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn DeferredExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Resolve configuration and wire the pipeline. Must be called inside a
    /// tokio runtime.
    pub async fn build(self) -> TrackerResult<Tracker> {
        Handle::try_current().map_err(|e| TrackerError::NoRuntime(e.to_string()))?;

        let executor = self.executor.unwrap_or_else(default_executor);
        let queue = BatchQueue::new(executor);
        let channel = self
            .channel
            .unwrap_or_else(|| Arc::new(NullChannel) as Arc<dyn DeliveryChannel>);
        let report = Arc::new(plugins::ReportPlugin::new(
            channel,
            self.send_hook,
            Arc::clone(&queue),
        ));

        let plugins = plugins::resolve_plugins(self.plugins, report);
        let config = Arc::new(resolve_config(self.config, &plugins).await?);
        let container = Arc::new(PluginContainer::new(plugins, config.fault_policy()));

        let host = self
            .host
            .unwrap_or_else(|| Arc::new(StaticHost::default()) as Arc<dyn HostInfo>);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn IdentityStore>);
        let settings = config.settings();
        let context = Arc::new(PageContext::new(
            host,
            Identity::new(store),
            &settings.app_id,
            &settings.sdk_version,
            settings.extra.clone(),
        ));

        let collector = Collector::new(
            Arc::clone(&container),
            Arc::clone(&config),
            Arc::clone(&context),
        )?;

        tracing::debug!(
            plugins = ?container.plugin_names(),
            policy = ?config.fault_policy(),
            "tracker built"
        );

        Ok(Tracker {
            config,
            container,
            collector,
            context,
            queue,
        })
    }
}

/// The telemetry pipeline for one page
pub struct Tracker {
    config: Arc<ResolvedConfig>,
    container: Arc<PluginContainer>,
    collector: Collector,
    context: Arc<PageContext>,
    queue: Arc<BatchQueue>,
}

impl Tracker {
    pub fn builder(config: UserConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    /// Hand in an observation. Fire-and-forget.
    pub fn collect(&self, event: Event) {
        self.collector.collect(event);
    }

    /// Signal that the page has loaded: replays cached events and switches
    /// to immediate dispatch. Idempotent.
    pub async fn page_ready(&self) {
        self.collector.mark_ready().await;
    }

    pub fn is_ready(&self) -> bool {
        self.collector.is_ready()
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn container(&self) -> &PluginContainer {
        &self.container
    }

    /// Current page-visit id
    pub fn page_id(&self) -> String {
        self.context.page_id()
    }

    /// Traversals still running
    pub fn in_flight(&self) -> usize {
        self.collector.in_flight()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Run pending deliveries now instead of waiting for the executor
    pub fn flush_reports(&self) -> usize {
        self.queue.flush()
    }

    /// Wait for every dispatched traversal to finish, then flush deliveries
    pub async fn settle(&self) -> usize {
        self.collector.wait_idle().await;
        self.flush_reports()
    }
}
