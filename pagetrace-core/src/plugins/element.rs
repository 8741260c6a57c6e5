//! Click target rendering

use async_trait::async_trait;

use crate::error::TrackerResult;
use crate::event::{BehaviorEvent, ClickData, ElementNode, EnrichedEvent, Event, EventKind};
use crate::plugin::Plugin;

/// Renders the clicked element's ancestry into `data.chain`
#[derive(Debug, Default)]
pub struct ElementParserPlugin;

impl ElementParserPlugin {
    pub fn new() -> Self {
        Self
    }
}

/// `div#main.list > li#.item.active`; `html` and `body` are left out
pub fn render_chain(path: &[ElementNode]) -> String {
    path.iter()
        .filter(|node| {
            let tag = node.tag.to_ascii_lowercase();
            tag != "html" && tag != "body"
        })
        .map(|node| {
            format!(
                "{}#{}.{}",
                node.tag.to_ascii_lowercase(),
                node.id,
                node.classes.join(".")
            )
        })
        .collect::<Vec<_>>()
        .join(" > ")
}

#[async_trait]
impl Plugin for ElementParserPlugin {
    fn name(&self) -> &str {
        "pagetrace-element-parser"
    }

    async fn load(&self, event: &EnrichedEvent) -> TrackerResult<Option<EnrichedEvent>> {
        let base = event.event();
        let EventKind::Behavior(BehaviorEvent::UiClick { data }) = &base.kind else {
            return Ok(None);
        };

        let refined = Event {
            kind: EventKind::Behavior(BehaviorEvent::UiClick {
                data: ClickData {
                    path: data.path.clone(),
                    chain: render_chain(&data.path),
                },
            }),
            timestamp: base.timestamp,
            url: base.url.clone(),
        };
        Ok(Some(event.clone().with_event(refined)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(tag: &str, id: &str, classes: &[&str]) -> ElementNode {
        ElementNode {
            tag: tag.to_string(),
            id: id.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_render_chain() {
        let path = vec![
            node("HTML", "", &[]),
            node("BODY", "", &[]),
            node("DIV", "main", &["list"]),
            node("BUTTON", "", &["buy", "primary"]),
        ];
        assert_eq!(render_chain(&path), "div#main.list > button#.buy.primary");
        assert_eq!(render_chain(&[]), "");
    }

    #[tokio::test]
    async fn test_load_fills_chain() {
        let click = Event::click(
            vec![node("body", "", &[]), node("a", "home", &[])],
            "https://shop.example/",
        );
        let loaded = ElementParserPlugin::new()
            .load(&EnrichedEvent::bare(click))
            .await
            .unwrap()
            .unwrap();

        match &loaded.event().kind {
            EventKind::Behavior(BehaviorEvent::UiClick { data }) => {
                assert_eq!(data.chain, "a#home.");
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_events_untouched() {
        let nav = EnrichedEvent::bare(Event::navigation("/a", "/b"));
        assert!(ElementParserPlugin::new().load(&nav).await.unwrap().is_none());
    }
}
