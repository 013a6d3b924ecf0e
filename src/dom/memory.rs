// src/dom/memory.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow, bail};
use tracing::debug;

use super::selector::{Selector, SelectorTarget};
use super::{
    Document, Element, MutationKind, MutationRecord, NewElement, NodeId, PageStorage, describe,
};
use crate::errors::PagewatchError;
use crate::feed::{ChangeFeed, FeedRegistry};
use crate::types::InsertPosition;

/// Callback run after an element is clicked.
pub type ClickHook = Arc<dyn Fn(&MemoryDocument, NodeId) + Send + Sync>;

/// Everything the page was made to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Clicked { node: NodeId, element: String },
    Removed { node: NodeId, element: String },
    Inserted { node: NodeId, element: String },
    ValueSet { node: NodeId, value: String },
    EventDispatched { node: NodeId, event: String },
    Navigated { from: String, to: String },
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalEntry::Clicked { node, element } => write!(f, "click    {element} ({node})"),
            JournalEntry::Removed { node, element } => write!(f, "remove   {element} ({node})"),
            JournalEntry::Inserted { node, element } => write!(f, "insert   {element} ({node})"),
            JournalEntry::ValueSet { node, value } => write!(f, "value    {node} = {value:?}"),
            JournalEntry::EventDispatched { node, event } => write!(f, "event    {event} -> {node}"),
            JournalEntry::Navigated { from, to } => write!(f, "navigate {from} -> {to}"),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    value: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    location: String,
    journal: Vec<JournalEntry>,
}

impl Tree {
    fn new(location: String) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            location,
            journal: Vec::new(),
        };
        let root = tree.alloc(NewElement::new("html"));
        let body = tree.alloc(NewElement::new("body"));
        tree.nodes[body.0].parent = Some(root);
        tree.nodes[root.0].children.push(body);
        tree.root = root;
        tree.body = body;
        tree
    }

    fn alloc(&mut self, spec: NewElement) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: spec.tag,
            attrs: spec.attrs,
            text: spec.text,
            value: String::new(),
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn is_connected(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.node(current).and_then(|n| n.parent);
        }
        false
    }

    /// `id` followed by all of its ancestors.
    fn ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.node(current).and_then(|n| n.parent);
        }
        out
    }

    fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.node(id) {
            out.push_str(&node.text);
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }

    fn snapshot(&self, id: NodeId) -> Option<Element> {
        if !self.is_connected(id) {
            return None;
        }
        let node = self.node(id)?;
        Some(Element {
            node: id,
            tag: node.tag.clone(),
            attrs: node.attrs.clone(),
            text: self.text_content(id),
            value: node.value.clone(),
        })
    }

    fn describe(&self, id: NodeId) -> String {
        self.node(id)
            .map(|n| describe(&n.tag, &n.attrs))
            .unwrap_or_else(|| id.to_string())
    }

    fn collect_matches(&self, id: NodeId, selector: &Selector, out: &mut Vec<Element>) {
        if selector.matches(self, id) {
            if let Some(el) = self.snapshot(id) {
                out.push(el);
            }
        }
        if let Some(node) = self.node(id) {
            for child in &node.children {
                self.collect_matches(*child, selector, out);
            }
        }
    }

    fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(id.0)?.parent?;
        self.nodes[parent.0].children.retain(|c| *c != id);
        self.nodes[id.0].parent = None;
        Some(parent)
    }

    fn attach(&mut self, parent: NodeId, index: usize, child: NodeId) {
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    fn index_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.node(id)?.parent?;
        let index = self.node(parent)?.children.iter().position(|c| *c == id)?;
        Some((parent, index))
    }
}

impl SelectorTarget for Tree {
    fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.node(node).map(|n| n.tag.as_str())
    }

    fn attribute(&self, node: NodeId, key: &str) -> Option<&str> {
        self.node(node)
            .and_then(|n| n.attrs.get(key))
            .map(String::as_str)
    }

    fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }
}

#[derive(Debug, Default)]
struct StorageState {
    blocked: bool,
    items: HashMap<String, String>,
    cookies: BTreeMap<String, String>,
    raw_cookies: Vec<String>,
}

/// In-memory document tree.
///
/// Cloning is cheap and yields another handle to the same page, so tests can
/// keep one handle to mutate the page while watchers hold another.
#[derive(Clone)]
pub struct MemoryDocument {
    tree: Arc<Mutex<Tree>>,
    feeds: Arc<FeedRegistry>,
    storage: Arc<Mutex<StorageState>>,
    click_hooks: Arc<Mutex<HashMap<NodeId, ClickHook>>>,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("location", &self.location())
            .field("live_feeds", &self.feeds.live_count())
            .finish_non_exhaustive()
    }
}

impl MemoryDocument {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new(location.into()))),
            feeds: FeedRegistry::new(),
            storage: Arc::new(Mutex::new(StorageState::default())),
            click_hooks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn storage_state(&self) -> MutexGuard<'_, StorageState> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, kind: MutationKind, target: NodeId, ancestry: Vec<NodeId>) {
        let record = MutationRecord { kind, target };
        self.feeds
            .publish(&record, |root, _target| ancestry.contains(&root));
    }

    /// Append a new element as the last child of `parent`.
    ///
    /// This is the page changing itself: observers are notified but nothing
    /// is journaled.
    pub fn append(&self, parent: NodeId, element: NewElement) -> Result<NodeId> {
        self.insert_node(parent, InsertPosition::Append, element, false)
    }

    /// Append a new element under `<body>`.
    pub fn append_to_body(&self, element: NewElement) -> Result<NodeId> {
        let body = self.body();
        self.append(body, element)
    }

    pub fn set_attribute(&self, node: NodeId, key: &str, value: &str) -> Result<()> {
        let ancestry = {
            let mut tree = self.tree();
            let n = tree
                .nodes
                .get_mut(node.0)
                .ok_or_else(|| anyhow!("unknown node {node}"))?;
            n.attrs.insert(key.to_string(), value.to_string());
            tree.ancestry(node)
        };
        self.publish(MutationKind::Attributes, node, ancestry);
        Ok(())
    }

    pub fn set_text(&self, node: NodeId, text: &str) -> Result<()> {
        let ancestry = {
            let mut tree = self.tree();
            let n = tree
                .nodes
                .get_mut(node.0)
                .ok_or_else(|| anyhow!("unknown node {node}"))?;
            n.text = text.to_string();
            tree.ancestry(node)
        };
        self.publish(MutationKind::CharacterData, node, ancestry);
        Ok(())
    }

    /// Page-side removal of `node`; not journaled. Returns `false` if it was
    /// already gone.
    pub fn detach(&self, node: NodeId) -> bool {
        self.remove_node(node, false)
    }

    fn remove_node(&self, node: NodeId, journaled: bool) -> bool {
        let (parent, ancestry) = {
            let mut tree = self.tree();
            if !tree.is_connected(node) || node == tree.root {
                return false;
            }
            let element = tree.describe(node);
            let Some(parent) = tree.detach(node) else {
                return false;
            };
            if journaled {
                tree.journal.push(JournalEntry::Removed { node, element });
            }
            (parent, tree.ancestry(parent))
        };
        self.publish(MutationKind::ChildList, parent, ancestry);
        true
    }

    fn insert_node(
        &self,
        target: NodeId,
        position: InsertPosition,
        element: NewElement,
        journaled: bool,
    ) -> Result<NodeId> {
        let (new_id, parent, ancestry) = {
            let mut tree = self.tree();
            if !tree.is_connected(target) {
                bail!("insert target {target} is not attached to the document");
            }
            let (parent, index) = match position {
                InsertPosition::Append => {
                    let len = tree.node(target).map(|n| n.children.len()).unwrap_or(0);
                    (target, len)
                }
                InsertPosition::Prepend => (target, 0),
                InsertPosition::Before | InsertPosition::Replace => tree
                    .index_in_parent(target)
                    .ok_or_else(|| anyhow!("insert target {target} has no parent"))?,
                InsertPosition::After => {
                    let (parent, index) = tree
                        .index_in_parent(target)
                        .ok_or_else(|| anyhow!("insert target {target} has no parent"))?;
                    (parent, index + 1)
                }
            };

            let new_id = tree.alloc(element);
            tree.attach(parent, index, new_id);
            if position == InsertPosition::Replace {
                let element = tree.describe(target);
                tree.detach(target);
                if journaled {
                    tree.journal.push(JournalEntry::Removed {
                        node: target,
                        element,
                    });
                }
            }
            if journaled {
                let element = tree.describe(new_id);
                tree.journal.push(JournalEntry::Inserted {
                    node: new_id,
                    element,
                });
            }
            (new_id, parent, tree.ancestry(parent))
        };
        self.publish(MutationKind::ChildList, parent, ancestry);
        Ok(new_id)
    }

    /// Change the location the way a single-page app does (history push).
    pub fn push_state(&self, url: &str) {
        let body = {
            let mut tree = self.tree();
            tree.location = url.to_string();
            tree.body
        };
        self.publish(MutationKind::Navigation, body, Vec::new());
    }

    /// Run `hook` every time `node` is clicked.
    pub fn on_click(&self, node: NodeId, hook: ClickHook) {
        self.click_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node, hook);
    }

    /// Make local storage and cookies fail as if the host blocked them.
    pub fn block_storage(&self, blocked: bool) {
        self.storage_state().blocked = blocked;
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.tree().journal.clone()
    }

    /// How many times `node` was clicked.
    pub fn click_count(&self, node: NodeId) -> usize {
        self.tree()
            .journal
            .iter()
            .filter(|e| matches!(e, JournalEntry::Clicked { node: n, .. } if *n == node))
            .count()
    }

    /// Raw cookie strings exactly as they were set.
    pub fn raw_cookies(&self) -> Vec<String> {
        self.storage_state().raw_cookies.clone()
    }
}

impl PageStorage for MemoryDocument {
    fn get_item(&self, key: &str) -> crate::errors::Result<Option<String>> {
        let state = self.storage_state();
        if state.blocked {
            return Err(PagewatchError::Storage("localStorage is blocked".to_string()));
        }
        Ok(state.items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> crate::errors::Result<()> {
        let mut state = self.storage_state();
        if state.blocked {
            return Err(PagewatchError::Storage("localStorage is blocked".to_string()));
        }
        state.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn cookie_string(&self) -> crate::errors::Result<String> {
        let state = self.storage_state();
        if state.blocked {
            return Err(PagewatchError::Storage("cookies are blocked".to_string()));
        }
        Ok(state
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; "))
    }

    fn set_cookie(&self, cookie: &str) -> crate::errors::Result<()> {
        let mut state = self.storage_state();
        if state.blocked {
            return Err(PagewatchError::Storage("cookies are blocked".to_string()));
        }
        let pair = cookie.split(';').next().unwrap_or("");
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| PagewatchError::Storage(format!("malformed cookie: {cookie}")))?;
        state
            .cookies
            .insert(name.trim().to_string(), value.trim().to_string());
        state.raw_cookies.push(cookie.to_string());
        Ok(())
    }
}

impl Document for MemoryDocument {
    fn body(&self) -> NodeId {
        self.tree().body
    }

    fn query_all(&self, selector: &Selector) -> Vec<Element> {
        let tree = self.tree();
        let mut out = Vec::new();
        tree.collect_matches(tree.root, selector, &mut out);
        out
    }

    fn query_all_within(&self, root: NodeId, selector: &Selector) -> Vec<Element> {
        let tree = self.tree();
        let mut out = Vec::new();
        if !tree.is_connected(root) {
            return out;
        }
        if let Some(node) = tree.node(root) {
            for child in &node.children {
                tree.collect_matches(*child, selector, &mut out);
            }
        }
        out
    }

    fn element(&self, node: NodeId) -> Option<Element> {
        self.tree().snapshot(node)
    }

    fn location(&self) -> String {
        self.tree().location.clone()
    }

    fn subscribe(&self, root: NodeId) -> ChangeFeed {
        self.feeds.subscribe(root)
    }

    fn live_feeds(&self) -> usize {
        self.feeds.live_count()
    }

    fn click(&self, node: NodeId) -> Result<()> {
        {
            let mut tree = self.tree();
            if tree.node(node).is_none() {
                bail!("unknown node {node}");
            }
            let element = tree.describe(node);
            debug!(%node, %element, "click");
            tree.journal.push(JournalEntry::Clicked { node, element });
        }

        // Hooks run without any lock held; they usually mutate the page.
        let hook = self
            .click_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&node)
            .cloned();
        if let Some(hook) = hook {
            hook(self, node);
        }
        Ok(())
    }

    fn remove(&self, node: NodeId) -> bool {
        self.remove_node(node, true)
    }

    fn set_value(&self, node: NodeId, value: &str) -> Result<()> {
        let ancestry = {
            let mut tree = self.tree();
            let n = tree
                .nodes
                .get_mut(node.0)
                .ok_or_else(|| anyhow!("unknown node {node}"))?;
            n.value = value.to_string();
            tree.journal.push(JournalEntry::ValueSet {
                node,
                value: value.to_string(),
            });
            tree.ancestry(node)
        };
        self.publish(MutationKind::CharacterData, node, ancestry);
        Ok(())
    }

    fn dispatch_event(&self, node: NodeId, event: &str) -> Result<()> {
        let mut tree = self.tree();
        if tree.node(node).is_none() {
            bail!("unknown node {node}");
        }
        tree.journal.push(JournalEntry::EventDispatched {
            node,
            event: event.to_string(),
        });
        Ok(())
    }

    fn insert(
        &self,
        target: NodeId,
        position: InsertPosition,
        element: NewElement,
    ) -> Result<NodeId> {
        self.insert_node(target, position, element, true)
    }

    fn navigate(&self, url: &str) -> Result<()> {
        let body = {
            let mut tree = self.tree();
            let from = std::mem::replace(&mut tree.location, url.to_string());
            debug!(%from, to = %url, "navigate");
            tree.journal.push(JournalEntry::Navigated {
                from,
                to: url.to_string(),
            });
            tree.body
        };
        self.publish(MutationKind::Navigation, body, Vec::new());
        Ok(())
    }
}
