//! Performance payloads: web vitals and the navigation timing snapshot

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricName {
    Lcp,
    Cls,
    Fcp,
    Ttfb,
    Inp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: MetricName,
    pub rating: Rating,
    pub value: f64,
}

/// Navigation timing marks, in milliseconds relative to time origin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationTiming {
    pub start_time: f64,
    pub redirect_start: f64,
    pub redirect_end: f64,
    pub fetch_start: f64,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub unload_event_start: f64,
    pub unload_event_end: f64,
    pub dom_interactive: f64,
    pub dom_content_loaded_event_end: f64,
    pub dom_complete: f64,
    pub load_event_start: f64,
}

/// Phase durations derived from a [`NavigationTiming`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseDurations {
    /// DNS lookup
    pub dns: f64,
    /// TCP connect
    pub tcp: f64,
    /// Fetch start to first byte
    pub first_byte: f64,
    /// Fetch start to DOMContentLoaded end
    pub dom_ready: f64,
    /// Fetch start to load event
    pub load: f64,
    /// Time origin to fetch start
    pub fetch_ready: f64,
    pub redirect: f64,
    pub unload: f64,
    /// Request start to response end
    pub html_download: f64,
    /// DOM interactive to DOM complete
    pub dom_parse: f64,
}

fn span(start: f64, end: f64) -> f64 {
    let value = end - start;
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

impl PhaseDurations {
    pub fn from_timing(t: &NavigationTiming) -> Self {
        Self {
            dns: span(t.domain_lookup_start, t.domain_lookup_end),
            tcp: span(t.connect_start, t.connect_end),
            first_byte: span(t.fetch_start, t.response_start),
            dom_ready: span(t.fetch_start, t.dom_content_loaded_event_end),
            load: span(t.fetch_start, t.load_event_start),
            fetch_ready: span(t.start_time, t.fetch_start),
            redirect: span(t.redirect_start, t.redirect_end),
            unload: span(t.unload_event_start, t.unload_event_end),
            html_download: span(t.request_start, t.response_end),
            dom_parse: span(t.dom_interactive, t.dom_complete),
        }
    }
}

/// One resource timing entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceEntry {
    pub name: String,
    pub initiator_type: String,
    pub start_time: f64,
    pub duration: f64,
    pub transfer_size: u64,
    pub encoded_body_size: u64,
    pub decoded_body_size: u64,
    pub response_status: u16,
    pub is_cache: bool,
}

impl ResourceEntry {
    /// Served from cache: nothing crossed the wire, or an empty body did
    pub fn served_from_cache(&self) -> bool {
        self.transfer_size == 0 || self.encoded_body_size == 0
    }

    fn is_async_request(&self) -> bool {
        matches!(
            self.initiator_type.as_str(),
            "fetch" | "xmlhttprequest" | "beacon"
        )
    }
}

/// `performance/resource` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_timing: Option<NavigationTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<PhaseDurations>,
    #[serde(default)]
    pub entries: Vec<ResourceEntry>,
}

impl ResourceTiming {
    /// Build the snapshot from raw marks, deriving phase durations
    pub fn from_navigation(
        navigation_type: impl Into<String>,
        timing: NavigationTiming,
        entries: Vec<ResourceEntry>,
    ) -> Self {
        Self {
            navigation_type: Some(navigation_type.into()),
            timing: Some(PhaseDurations::from_timing(&timing)),
            navigation_timing: Some(timing),
            entries,
        }
    }
}

/// Filter raw resource entries for reporting.
///
/// Async requests aimed at the collector endpoint are our own deliveries and
/// are dropped; every kept entry gets its `is_cache` flag set.
pub fn resource_snapshot(entries: &[ResourceEntry], endpoint: &str) -> Vec<ResourceEntry> {
    entries
        .iter()
        .filter(|entry| {
            !entry.is_async_request() || endpoint.is_empty() || !entry.name.contains(endpoint)
        })
        .map(|entry| ResourceEntry {
            is_cache: entry.served_from_cache(),
            ..entry.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_durations() {
        let timing = NavigationTiming {
            start_time: 0.0,
            fetch_start: 5.0,
            domain_lookup_start: 6.0,
            domain_lookup_end: 16.0,
            connect_start: 16.0,
            connect_end: 40.0,
            request_start: 41.0,
            response_start: 90.0,
            response_end: 120.0,
            dom_interactive: 300.0,
            dom_content_loaded_event_end: 350.0,
            dom_complete: 500.0,
            load_event_start: 505.0,
            ..Default::default()
        };

        let d = PhaseDurations::from_timing(&timing);
        assert_eq!(d.dns, 10.0);
        assert_eq!(d.tcp, 24.0);
        assert_eq!(d.first_byte, 85.0);
        assert_eq!(d.dom_ready, 345.0);
        assert_eq!(d.load, 500.0);
        assert_eq!(d.fetch_ready, 5.0);
        assert_eq!(d.html_download, 79.0);
        assert_eq!(d.dom_parse, 200.0);
        // unset marks never go negative
        assert_eq!(d.redirect, 0.0);
        assert_eq!(d.unload, 0.0);
    }

    #[test]
    fn test_resource_snapshot_drops_own_deliveries() {
        let entries = vec![
            ResourceEntry {
                name: "https://cdn.example/app.js".into(),
                initiator_type: "script".into(),
                transfer_size: 2048,
                encoded_body_size: 2000,
                ..Default::default()
            },
            ResourceEntry {
                name: "https://collect.example/report".into(),
                initiator_type: "fetch".into(),
                transfer_size: 300,
                encoded_body_size: 10,
                ..Default::default()
            },
            ResourceEntry {
                name: "https://api.example/items".into(),
                initiator_type: "xmlhttprequest".into(),
                transfer_size: 0,
                ..Default::default()
            },
        ];

        let kept = resource_snapshot(&entries, "https://collect.example/report");
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].name, "https://cdn.example/app.js");
        assert!(!kept[0].is_cache);
        assert!(kept[1].is_cache);
    }
}
