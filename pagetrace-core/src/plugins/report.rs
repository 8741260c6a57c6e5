//! Delivery plugin, always last in the pipeline

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;

use crate::config::ResolvedConfig;
use crate::error::TrackerResult;
use crate::event::Payload;
use crate::plugin::Plugin;
use crate::queue::BatchQueue;
use crate::transport::{DeliveryChannel, SendHook, Transport};

/// Where the `end` hook sends payloads
#[derive(Clone)]
pub enum ReportTarget {
    /// Sending is off or the endpoint is unusable
    Disabled,
    /// Integrator override, called from the batching queue
    Hook(SendHook),
    Transport(Transport),
}

impl std::fmt::Debug for ReportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportTarget::Disabled => f.write_str("Disabled"),
            ReportTarget::Hook(_) => f.write_str("Hook(<callback>)"),
            ReportTarget::Transport(t) => write!(f, "Transport({:?})", t.mode()),
        }
    }
}

/// Sends every delivered payload. The target is fixed once the
/// configuration is resolved.
pub struct ReportPlugin {
    channel: Arc<dyn DeliveryChannel>,
    send_hook: Option<SendHook>,
    queue: Arc<BatchQueue>,
    target: OnceCell<ReportTarget>,
}

impl ReportPlugin {
    pub fn new(
        channel: Arc<dyn DeliveryChannel>,
        send_hook: Option<SendHook>,
        queue: Arc<BatchQueue>,
    ) -> Self {
        Self {
            channel,
            send_hook,
            queue,
            target: OnceCell::new(),
        }
    }

    pub fn target(&self) -> Option<&ReportTarget> {
        self.target.get()
    }

    fn select_target(&self, config: &ResolvedConfig) -> ReportTarget {
        if !config.settings().send_enabled {
            return ReportTarget::Disabled;
        }
        if let Some(hook) = &self.send_hook {
            return ReportTarget::Hook(Arc::clone(hook));
        }
        if !config.delivery_enabled() {
            return ReportTarget::Disabled;
        }
        ReportTarget::Transport(Transport::new(
            config.report_mode(),
            config.endpoint(),
            Arc::clone(&self.channel),
            Arc::clone(&self.queue),
        ))
    }
}

#[async_trait]
impl Plugin for ReportPlugin {
    fn name(&self) -> &str {
        "pagetrace-report"
    }

    async fn config_resolved(&self, config: &ResolvedConfig) -> TrackerResult<()> {
        let target = self.select_target(config);
        tracing::debug!(channel = self.channel.name(), target = ?target, "report target selected");
        if self.target.set(target).is_err() {
            tracing::warn!("report target already selected, keeping the first one");
        }
        Ok(())
    }

    async fn end(&self, payload: &Payload) -> TrackerResult<()> {
        match self.target.get() {
            Some(ReportTarget::Transport(transport)) => transport.send(payload),
            Some(ReportTarget::Hook(hook)) => {
                let hook = Arc::clone(hook);
                let payload = payload.clone();
                self.queue.enqueue(Box::new(move || (*hook)(&payload)));
            }
            Some(ReportTarget::Disabled) => {}
            None => tracing::warn!("report dropped, configuration not resolved"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;
    use crate::executor::ManualExecutor;
    use crate::transport::MemoryChannel;
    use serde_json::json;
    use std::sync::Mutex;

    fn plugin(hook: Option<SendHook>) -> (ReportPlugin, MemoryChannel, Arc<ManualExecutor>) {
        let channel = MemoryChannel::new();
        let executor = Arc::new(ManualExecutor::new());
        let plugin = ReportPlugin::new(
            Arc::new(channel.clone()),
            hook,
            BatchQueue::new(executor.clone()),
        );
        (plugin, channel, executor)
    }

    #[tokio::test]
    async fn test_sends_through_queue() {
        let (plugin, channel, executor) = plugin(None);
        let config = ResolvedConfig::resolve(UserConfig::new("shop", "https://c.example/r"));
        plugin.config_resolved(&config).await.unwrap();

        plugin.end(&Payload::from(json!({"n": 1}))).await.unwrap();
        assert_eq!(channel.delivery_count(), 0);
        executor.run_pending();
        assert_eq!(channel.payloads(), vec![json!({"n": 1})]);
        assert_eq!(channel.deliveries()[0].url, "https://c.example/r");
    }

    #[tokio::test]
    async fn test_invalid_endpoint_disables() {
        let (plugin, channel, executor) = plugin(None);
        let config = ResolvedConfig::resolve(UserConfig::new("shop", "nowhere"));
        plugin.config_resolved(&config).await.unwrap();

        plugin.end(&Payload::from(json!({"n": 1}))).await.unwrap();
        executor.run_pending();
        assert_eq!(channel.delivery_count(), 0);
        assert!(matches!(plugin.target(), Some(ReportTarget::Disabled)));
    }

    #[tokio::test]
    async fn test_send_hook_replaces_channel() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook: SendHook = Arc::new(move |payload: &Payload| {
            sink.lock().unwrap().push(serde_json::to_value(payload).unwrap());
        });

        let (plugin, channel, executor) = plugin(Some(hook));
        let config = ResolvedConfig::resolve(UserConfig::new("shop", ""));
        plugin.config_resolved(&config).await.unwrap();

        plugin.end(&Payload::from(json!({"n": 2}))).await.unwrap();
        assert!(seen.lock().unwrap().is_empty(), "never called inline");
        executor.run_pending();
        assert_eq!(channel.delivery_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![json!({"n": 2})]);
    }
}
