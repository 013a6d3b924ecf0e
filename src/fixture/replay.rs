// src/fixture/replay.rs

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::dom::{Document, MemoryDocument, NodeId, Selector};
use crate::errors::{PagewatchError, Result};
use crate::fixture::model::{EventAction, PageFixture, PageNode};

fn resolve_parent(doc: &MemoryDocument, node: &PageNode) -> Result<Option<NodeId>> {
    match &node.parent {
        None => Ok(Some(doc.body())),
        Some(source) => {
            let selector = Selector::parse(source)?;
            Ok(doc.query(&selector).map(|el| el.node))
        }
    }
}

/// Build the initial page. A node whose parent selector matches nothing is
/// an error.
pub fn build_document(fixture: &PageFixture) -> Result<MemoryDocument> {
    let doc = MemoryDocument::new(fixture.url.clone());
    for node in &fixture.nodes {
        let Some(parent) = resolve_parent(&doc, node)? else {
            return Err(PagewatchError::ConfigError(format!(
                "page fixture: no parent matches `{}` for <{}>",
                node.parent.as_deref().unwrap_or_default(),
                node.tag
            )));
        };
        doc.append(parent, node.to_element())?;
    }
    debug!(nodes = fixture.nodes.len(), url = %fixture.url, "page built");
    Ok(doc)
}

/// Play the fixture's timeline, relative to the moment this is called.
///
/// Events that cannot be applied (a selector that matches nothing) are
/// logged and skipped.
pub async fn replay_timeline(doc: MemoryDocument, fixture: PageFixture) {
    let start = Instant::now();
    for event in fixture.events {
        tokio::time::sleep_until(start + Duration::from_millis(event.at_ms)).await;
        debug!(at_ms = event.at_ms, action = ?event.action, "page event");
        if let Err(err) = apply(&doc, &event.action) {
            warn!(at_ms = event.at_ms, error = %err, "page event skipped");
        }
    }
}

fn apply(doc: &MemoryDocument, action: &EventAction) -> Result<()> {
    match action {
        EventAction::Insert(node) => {
            let parent = resolve_parent(doc, node)?.ok_or_else(|| {
                PagewatchError::ConfigError(format!(
                    "no parent matches `{}`",
                    node.parent.as_deref().unwrap_or_default()
                ))
            })?;
            doc.append(parent, node.to_element())?;
        }
        EventAction::Remove(source) => {
            let selector = Selector::parse(source)?;
            for el in doc.query_all(&selector) {
                doc.detach(el.node);
            }
        }
        EventAction::Navigate(url) => doc.push_state(url),
        EventAction::SetAttr(set) => {
            let selector = Selector::parse(&set.selector)?;
            let Some(el) = doc.query(&selector) else {
                return Err(PagewatchError::ConfigError(format!(
                    "no element matches `{}`",
                    set.selector
                )));
            };
            doc.set_attribute(el.node, &set.name, &set.value)?;
        }
    }
    Ok(())
}
