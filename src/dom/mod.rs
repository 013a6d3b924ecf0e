// src/dom/mod.rs

//! The host document boundary.
//!
//! Watchers never touch a page directly; they go through the [`Document`]
//! trait. [`memory::MemoryDocument`] is the in-process implementation used for
//! headless replay and tests.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use anyhow::Result;

use crate::feed::ChangeFeed;
use crate::types::InsertPosition;

pub mod memory;
pub mod selector;

pub use memory::{JournalEntry, MemoryDocument};
pub use selector::Selector;

/// Shared handle to a document, as held by watchers and actions.
pub type SharedDocument = Arc<dyn Document>;

/// Stable identity of a node within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Snapshot of an element taken at query time.
///
/// The page may change after the snapshot is taken; anything acting on it
/// should re-check with [`Document::element`] first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub node: NodeId,
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Text content of the element and all of its descendants.
    pub text: String,
    /// Current form value (empty for non-form elements).
    pub value: String,
}

impl Element {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Short `tag#id.class` description for logs.
    pub fn describe(&self) -> String {
        describe(&self.tag, &self.attrs)
    }
}

pub(crate) fn describe(tag: &str, attrs: &BTreeMap<String, String>) -> String {
    let mut out = tag.to_string();
    if let Some(id) = attrs.get("id") {
        out.push('#');
        out.push_str(id);
    }
    if let Some(class) = attrs.get("class") {
        for c in class.split_ascii_whitespace() {
            out.push('.');
            out.push_str(c);
        }
    }
    out
}

/// Description of an element to be created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
}

impl NewElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

/// What kind of change a [`MutationRecord`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Children were added or removed under `target`.
    ChildList,
    /// An attribute of `target` changed.
    Attributes,
    /// Text or form value of `target` changed.
    CharacterData,
    /// The document location changed (navigation or history push).
    Navigation,
}

/// One observed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: NodeId,
}

impl MutationRecord {
    /// Navigation is not scoped to a subtree; every feed hears about it.
    pub fn is_global(&self) -> bool {
        self.kind == MutationKind::Navigation
    }
}

/// Page persistence (local storage and cookies).
///
/// Hosts may block these APIs; implementations then return
/// [`crate::errors::PagewatchError::Storage`].
pub trait PageStorage {
    fn get_item(&self, key: &str) -> crate::errors::Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> crate::errors::Result<()>;
    /// All cookies visible to the page, as `name=value` pairs joined by `"; "`.
    fn cookie_string(&self) -> crate::errors::Result<String>;
    /// Store a raw cookie string such as `name=value; expires=...; path=/`.
    fn set_cookie(&self, cookie: &str) -> crate::errors::Result<()>;
}

/// Abstract page interface.
pub trait Document: PageStorage + Send + Sync + Debug {
    /// Root node for change feeds that do not name one.
    fn body(&self) -> NodeId;

    /// Every element matching `selector`, in document (pre-)order.
    fn query_all(&self, selector: &Selector) -> Vec<Element>;

    /// First element matching `selector`.
    fn query(&self, selector: &Selector) -> Option<Element> {
        self.query_all(selector).into_iter().next()
    }

    /// Matching descendants of `root`, in document order.
    fn query_all_within(&self, root: NodeId, selector: &Selector) -> Vec<Element>;

    /// Current snapshot of `node`, or `None` if it is no longer attached.
    fn element(&self, node: NodeId) -> Option<Element>;

    fn location(&self) -> String;

    /// Subscribe to changes under `root`.
    fn subscribe(&self, root: NodeId) -> ChangeFeed;

    /// Number of change feeds that are still subscribed.
    fn live_feeds(&self) -> usize;

    fn click(&self, node: NodeId) -> Result<()>;

    /// Detach `node`. Returns `false` if it was already gone.
    fn remove(&self, node: NodeId) -> bool;

    fn set_value(&self, node: NodeId, value: &str) -> Result<()>;

    fn dispatch_event(&self, node: NodeId, event: &str) -> Result<()>;

    fn insert(&self, target: NodeId, position: InsertPosition, element: NewElement)
    -> Result<NodeId>;

    /// Replace the current location (no history entry).
    fn navigate(&self, url: &str) -> Result<()>;
}
