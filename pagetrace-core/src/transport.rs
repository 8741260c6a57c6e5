//! Report delivery
//!
//! [`Transport`] turns a payload into one delivery task on the batching
//! queue. The network mechanism itself sits behind [`DeliveryChannel`];
//! channels are infallible and swallow their own failures.

use std::sync::{Arc, Mutex};

use crate::config::ReportMode;
use crate::event::Payload;
use crate::queue::BatchQueue;
use crate::util::encode_uri_component;

/// Network mechanism used for reports
pub trait DeliveryChannel: Send + Sync {
    /// Channel name (for logging)
    fn name(&self) -> &'static str;

    /// Persistent best-effort send of a raw body
    fn beacon(&self, url: &str, body: &str);

    /// Pixel GET; the payload is already in `url`
    fn pixel(&self, url: &str);

    /// POST with a JSON body
    fn post_json(&self, url: &str, body: &str);
}

/// Integrator override that replaces the channel entirely
pub type SendHook = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Drops every report
#[derive(Debug, Default)]
pub struct NullChannel;

impl DeliveryChannel for NullChannel {
    fn name(&self) -> &'static str {
        "null"
    }

    fn beacon(&self, url: &str, body: &str) {
        tracing::debug!(url, bytes = body.len(), "beacon dropped");
    }

    fn pixel(&self, url: &str) {
        tracing::debug!(url, "pixel dropped");
    }

    fn post_json(&self, url: &str, body: &str) {
        tracing::debug!(url, bytes = body.len(), "post dropped");
    }
}

/// One recorded call on a [`MemoryChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub mode: ReportMode,
    pub url: String,
    /// Empty for pixel sends
    pub body: String,
}

/// In-memory channel for testing
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    deliveries: Arc<Mutex<Vec<Delivered>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivered> {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Delivered bodies parsed as JSON; pixel sends carry no body and are skipped
    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.deliveries()
            .iter()
            .filter_map(|d| serde_json::from_str(&d.body).ok())
            .collect()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn push(&self, mode: ReportMode, url: &str, body: &str) {
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Delivered {
                mode,
                url: url.to_string(),
                body: body.to_string(),
            });
    }
}

impl DeliveryChannel for MemoryChannel {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn beacon(&self, url: &str, body: &str) {
        self.push(ReportMode::Beacon, url, body);
    }

    fn pixel(&self, url: &str) {
        self.push(ReportMode::Img, url, "");
    }

    fn post_json(&self, url: &str, body: &str) {
        self.push(ReportMode::Xhr, url, body);
    }
}

/// Serializes payloads and queues their delivery
#[derive(Clone)]
pub struct Transport {
    mode: ReportMode,
    endpoint: String,
    channel: Arc<dyn DeliveryChannel>,
    queue: Arc<BatchQueue>,
}

impl Transport {
    pub fn new(
        mode: ReportMode,
        endpoint: &str,
        channel: Arc<dyn DeliveryChannel>,
        queue: Arc<BatchQueue>,
    ) -> Self {
        Self {
            mode,
            endpoint: endpoint.to_string(),
            channel,
            queue,
        }
    }

    pub fn mode(&self) -> ReportMode {
        self.mode
    }

    pub fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }

    /// Queue one report. Serialization failures are logged and dropped.
    pub fn send(&self, payload: &Payload) {
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("report dropped, serialization failed: {}", e);
                return;
            }
        };

        let mode = self.mode;
        let endpoint = self.endpoint.clone();
        let channel = Arc::clone(&self.channel);
        self.queue.enqueue(Box::new(move || match mode {
            ReportMode::Beacon => channel.beacon(&endpoint, &body),
            ReportMode::Img => channel.pixel(&pixel_url(&endpoint, &body)),
            ReportMode::Xhr => channel.post_json(&endpoint, &body),
        }));
    }
}

/// `endpoint?data=<encoded>`, or `&data=` when the endpoint has a query
pub fn pixel_url(endpoint: &str, body: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{}{}data={}", endpoint, separator, encode_uri_component(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ManualExecutor;
    use serde_json::json;

    #[test]
    fn test_pixel_url() {
        assert_eq!(
            pixel_url("https://c.example/r", "{\"a\":1}"),
            "https://c.example/r?data=%7B%22a%22%3A1%7D"
        );
        assert!(pixel_url("https://c.example/r?k=v", "x").starts_with("https://c.example/r?k=v&data="));
    }

    #[test]
    fn test_send_is_queued_not_inline() {
        let executor = Arc::new(ManualExecutor::new());
        let queue = BatchQueue::new(executor.clone());
        let channel = MemoryChannel::new();
        let transport = Transport::new(
            ReportMode::Xhr,
            "https://c.example/r",
            Arc::new(channel.clone()),
            queue,
        );

        transport.send(&Payload::from(json!({"n": 1})));
        transport.send(&Payload::from(json!({"n": 2})));
        assert_eq!(channel.delivery_count(), 0);
        assert_eq!(executor.pending(), 1);

        executor.run_pending();
        let payloads = channel.payloads();
        assert_eq!(payloads, vec![json!({"n": 1}), json!({"n": 2})]);
        assert_eq!(channel.deliveries()[0].mode, ReportMode::Xhr);
    }

    #[test]
    fn test_beacon_and_pixel_modes() {
        let executor = Arc::new(ManualExecutor::new());
        let channel = MemoryChannel::new();

        for mode in [ReportMode::Beacon, ReportMode::Img] {
            let transport = Transport::new(
                mode,
                "https://c.example/r",
                Arc::new(channel.clone()),
                BatchQueue::new(executor.clone()),
            );
            transport.send(&Payload::from(json!({"mode": "x"})));
        }
        executor.run_pending();

        let deliveries = channel.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].mode, ReportMode::Beacon);
        assert_eq!(deliveries[0].body, r#"{"mode":"x"}"#);
        assert_eq!(deliveries[1].mode, ReportMode::Img);
        assert!(deliveries[1].url.contains("?data=%7B"));
        assert!(deliveries[1].body.is_empty());
    }
}
