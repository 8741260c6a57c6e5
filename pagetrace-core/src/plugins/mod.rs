//! Built-in plugins
//!
//! Pipeline order: element parser, behavior tracking, error parser, then
//! integrator plugins, with delivery last so it sees the fully enriched
//! event.

mod behavior;
mod element;
mod error_parser;
mod report;

pub use behavior::BehaviorPlugin;
pub use element::{render_chain, ElementParserPlugin};
pub use error_parser::{parse_resource_failure, parse_stack, ErrorParserPlugin};
pub use report::{ReportPlugin, ReportTarget};

use std::sync::Arc;

use crate::plugin::Plugin;

/// Assemble the ordered pipeline
pub fn resolve_plugins(
    user_plugins: Vec<Arc<dyn Plugin>>,
    report: Arc<ReportPlugin>,
) -> Vec<Arc<dyn Plugin>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = vec![
        Arc::new(ElementParserPlugin::new()),
        Arc::new(BehaviorPlugin::new()),
        Arc::new(ErrorParserPlugin::new()),
    ];
    plugins.extend(user_plugins);
    plugins.push(report);
    plugins
}
