//! PageTrace replay CLI - run recorded events through the pipeline
//!
//! Reads a JSON array of events, feeds them to a tracker, fires the ready
//! transition and prints every report the tracker would send, one JSON
//! line per delivery.
//!
//! Usage:
//!     pagetrace-replay testdata/events.json
//!     pagetrace-replay --mode img --endpoint https://collect.example/r events.json
//!     pagetrace-replay --config tracker.json --repeat-errors events.json

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use pagetrace_core::{DeliveryChannel, Event, ReportMode, Tracker, UserConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pagetrace-replay")]
#[command(about = "Replay recorded page events through the PageTrace pipeline")]
#[command(version)]
struct Args {
    /// JSON file holding an array of events
    events: PathBuf,

    /// Tracker configuration (JSON); flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collector endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Delivery mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Send full detail for every repeated script error (default: keep
    /// the configured setting)
    #[arg(long)]
    repeat_errors: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Xhr,
    Beacon,
    Img,
}

impl From<Mode> for ReportMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Xhr => ReportMode::Xhr,
            Mode::Beacon => ReportMode::Beacon,
            Mode::Img => ReportMode::Img,
        }
    }
}

/// Prints each delivery on stdout
struct StdoutChannel;

impl StdoutChannel {
    fn print(&self, mode: ReportMode, url: &str, body: &str) {
        let body = serde_json::from_str::<serde_json::Value>(body)
            .unwrap_or_else(|_| serde_json::Value::String(body.to_string()));
        let line = serde_json::json!({ "mode": mode, "url": url, "body": body });
        println!("{}", line);
    }
}

impl DeliveryChannel for StdoutChannel {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn beacon(&self, url: &str, body: &str) {
        self.print(ReportMode::Beacon, url, body);
    }

    fn pixel(&self, url: &str) {
        self.print(ReportMode::Img, url, "");
    }

    fn post_json(&self, url: &str, body: &str) {
        self.print(ReportMode::Xhr, url, body);
    }
}

fn load_config(args: &Args) -> Result<UserConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => UserConfig::from_file(path)?,
        None => UserConfig::new("pagetrace-replay", "https://collect.invalid/report"),
    };
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(mode) = args.mode {
        config.report_mode = mode.into();
    }
    if args.repeat_errors {
        config.collectors.js_error.repeat = true;
    }
    Ok(config)
}

// Single worker: traversals and deliveries run on one thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr, deliveries to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagetrace_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let events: Vec<Event> = serde_json::from_str(&std::fs::read_to_string(&args.events)?)?;
    tracing::info!("Replaying {} event(s) from {}", events.len(), args.events.display());

    let tracker = Tracker::builder(config)
        .with_channel(Arc::new(StdoutChannel))
        .build()
        .await?;

    for event in events {
        tracker.collect(event);
    }
    tracker.page_ready().await;
    tracker.settle().await;

    let stats = tracker.queue_stats();
    tracing::info!(
        "Done: {} report(s) sent in {} batch(es)",
        stats.total_executed,
        stats.flush_count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pagetrace-replay").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults_keep_repeat() {
        let config = load_config(&args(&["events.json"])).unwrap();
        assert!(config.collectors.js_error.repeat);
        assert_eq!(config.report_mode, ReportMode::Xhr);
    }

    #[test]
    fn test_config_file_repeat_kept_without_flag() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"appId": "shop", "endpoint": "https://collect.example/r",
                "reportMode": "beacon", "collectors": {{"jsError": {{"repeat": true}}}}}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = load_config(&args(&["--config", &path, "events.json"])).unwrap();
        assert!(config.collectors.js_error.repeat);
        assert_eq!(config.app_id, "shop");
        assert_eq!(config.report_mode, ReportMode::Beacon);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"appId": "shop", "endpoint": "https://collect.example/r",
                "collectors": {{"jsError": {{"repeat": false}}}}}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = load_config(&args(&[
            "--config",
            &path,
            "--endpoint",
            "https://other.example/r",
            "--mode",
            "img",
            "--repeat-errors",
            "events.json",
        ]))
        .unwrap();
        assert!(config.collectors.js_error.repeat);
        assert_eq!(config.endpoint, "https://other.example/r");
        assert_eq!(config.report_mode, ReportMode::Img);
    }
}
