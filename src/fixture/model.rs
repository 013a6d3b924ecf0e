// src/fixture/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dom::{NewElement, Selector};
use crate::errors::{PagewatchError, Result};

/// Page fixture as read from TOML.
///
/// ```toml
/// url = "https://site/old/page"
///
/// [[node]]
/// tag = "div"
/// id = "player"
///
/// [[node]]
/// tag = "video"
/// parent = "#player"
/// attrs = { src = "https://cdn/movie-480p.mp4" }
///
/// [[event]]
/// at_ms = 200
/// insert = { tag = "button", id = "x", text = "Accept" }
///
/// [[event]]
/// at_ms = 400
/// remove = "#banner"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawPageFixture {
    pub url: String,

    /// Initial elements, created in file order.
    #[serde(default)]
    pub node: Vec<PageNode>,

    /// Timeline of page-side changes.
    #[serde(default)]
    pub event: Vec<RawPageEvent>,
}

/// One element of the page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageNode {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Selector for the parent element; `<body>` when omitted.
    #[serde(default)]
    pub parent: Option<String>,
}

impl PageNode {
    pub fn to_element(&self) -> NewElement {
        let mut el = NewElement::new(&self.tag);
        for (k, v) in &self.attrs {
            el = el.attr(k, v);
        }
        if let Some(id) = &self.id {
            el = el.id(id);
        }
        if let Some(class) = &self.class {
            el = el.class(class);
        }
        if let Some(text) = &self.text {
            el = el.text(text);
        }
        el
    }
}

/// `set_attr = { selector = "#x", name = "data-value", value = "1080" }`
#[derive(Debug, Clone, Deserialize)]
pub struct SetAttr {
    pub selector: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPageEvent {
    pub at_ms: u64,
    #[serde(default)]
    pub insert: Option<PageNode>,
    #[serde(default)]
    pub remove: Option<String>,
    #[serde(default)]
    pub navigate: Option<String>,
    #[serde(default)]
    pub set_attr: Option<SetAttr>,
}

/// What a timeline event does.
#[derive(Debug, Clone)]
pub enum EventAction {
    Insert(PageNode),
    /// Remove every element matching the selector.
    Remove(String),
    /// History push to the given URL.
    Navigate(String),
    SetAttr(SetAttr),
}

#[derive(Debug, Clone)]
pub struct PageEvent {
    pub at_ms: u64,
    pub action: EventAction,
}

/// Validated fixture; events sorted by time (stable for equal times).
#[derive(Debug, Clone)]
pub struct PageFixture {
    pub url: String,
    pub nodes: Vec<PageNode>,
    pub events: Vec<PageEvent>,
}

impl PageFixture {
    /// Time of the last event, or 0 without events.
    pub fn last_event_ms(&self) -> u64 {
        self.events.last().map_or(0, |e| e.at_ms)
    }
}

fn fixture_error(msg: impl Into<String>) -> PagewatchError {
    PagewatchError::ConfigError(format!("page fixture: {}", msg.into()))
}

fn validate_node(node: &PageNode) -> Result<()> {
    if node.tag.trim().is_empty() {
        return Err(fixture_error("node `tag` must not be empty"));
    }
    if let Some(parent) = &node.parent {
        Selector::parse(parent)?;
    }
    Ok(())
}

impl TryFrom<RawPageEvent> for PageEvent {
    type Error = PagewatchError;

    fn try_from(raw: RawPageEvent) -> std::result::Result<Self, Self::Error> {
        let at_ms = raw.at_ms;
        let mut actions = Vec::new();
        if let Some(node) = raw.insert {
            validate_node(&node)?;
            actions.push(EventAction::Insert(node));
        }
        if let Some(selector) = raw.remove {
            Selector::parse(&selector)?;
            actions.push(EventAction::Remove(selector));
        }
        if let Some(url) = raw.navigate {
            if url.trim().is_empty() {
                return Err(fixture_error(format!("event at {at_ms} ms: empty `navigate`")));
            }
            actions.push(EventAction::Navigate(url));
        }
        if let Some(set) = raw.set_attr {
            Selector::parse(&set.selector)?;
            actions.push(EventAction::SetAttr(set));
        }

        let count = actions.len();
        match actions.pop() {
            Some(action) if count == 1 => Ok(PageEvent { at_ms, action }),
            _ => Err(fixture_error(format!(
                "event at {at_ms} ms must have exactly one of insert, remove, navigate, set_attr (got {count})"
            ))),
        }
    }
}

impl TryFrom<RawPageFixture> for PageFixture {
    type Error = PagewatchError;

    fn try_from(raw: RawPageFixture) -> std::result::Result<Self, Self::Error> {
        if raw.url.trim().is_empty() {
            return Err(fixture_error("`url` must not be empty"));
        }
        for node in &raw.node {
            validate_node(node)?;
        }

        let mut events = raw
            .event
            .into_iter()
            .map(PageEvent::try_from)
            .collect::<Result<Vec<_>>>()?;
        events.sort_by_key(|e| e.at_ms);

        Ok(PageFixture {
            url: raw.url,
            nodes: raw.node,
            events,
        })
    }
}
