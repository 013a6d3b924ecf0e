// src/watcher/condition.rs

//! Conditions: pure queries against current document state.
//!
//! A condition is evaluated once eagerly at registration and again after
//! every change-feed batch. It must re-scan the full current state each time
//! (batches are coalesced, so incremental diffs cannot be trusted) and must
//! not mutate the page.

use anyhow::Result;

use crate::dom::{Document, NodeId, Selector};
use crate::watcher::{MatchResult, Payload};

pub trait Condition: Send + Sync {
    fn evaluate(&self, doc: &dyn Document) -> Result<MatchResult>;
}

impl<F> Condition for F
where
    F: Fn(&dyn Document) -> Result<MatchResult> + Send + Sync,
{
    fn evaluate(&self, doc: &dyn Document) -> Result<MatchResult> {
        self(doc)
    }
}

/// Every element matching a selector, optionally limited to a subtree.
#[derive(Debug, Clone)]
pub struct ElementsMatching {
    selector: Selector,
    root: Option<NodeId>,
}

impl ElementsMatching {
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            root: None,
        }
    }

    pub fn within(selector: Selector, root: NodeId) -> Self {
        Self {
            selector,
            root: Some(root),
        }
    }
}

impl Condition for ElementsMatching {
    fn evaluate(&self, doc: &dyn Document) -> Result<MatchResult> {
        let found = match self.root {
            Some(root) => doc.query_all_within(root, &self.selector),
            None => doc.query_all(&self.selector),
        };
        Ok((!found.is_empty()).then_some(Payload::Elements(found)))
    }
}

/// First `<button>` whose trimmed text contains a needle, ignoring case.
#[derive(Debug, Clone)]
pub struct ButtonWithText {
    needle: String,
    buttons: Selector,
}

impl ButtonWithText {
    pub fn new(text: &str) -> Self {
        Self {
            needle: text.to_lowercase(),
            buttons: Selector::tag("button"),
        }
    }
}

impl Condition for ButtonWithText {
    fn evaluate(&self, doc: &dyn Document) -> Result<MatchResult> {
        Ok(doc
            .query_all(&self.buttons)
            .into_iter()
            .find(|b| b.text.trim().to_lowercase().contains(&self.needle))
            .map(|b| Payload::Elements(vec![b])))
    }
}

/// Matches only when every selector finds an element; the payload holds the
/// first match of each, in selector order.
#[derive(Debug, Clone)]
pub struct AllPresent {
    selectors: Vec<Selector>,
}

impl AllPresent {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Self { selectors }
    }
}

impl Condition for AllPresent {
    fn evaluate(&self, doc: &dyn Document) -> Result<MatchResult> {
        let mut found = Vec::with_capacity(self.selectors.len());
        for selector in &self.selectors {
            match doc.query(selector) {
                Some(el) => found.push(el),
                None => return Ok(None),
            }
        }
        Ok((!found.is_empty()).then_some(Payload::Elements(found)))
    }
}

/// The current location, whenever it contains `needle`.
#[derive(Debug, Clone)]
pub struct LocationContains {
    needle: String,
}

impl LocationContains {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

impl Condition for LocationContains {
    fn evaluate(&self, doc: &dyn Document) -> Result<MatchResult> {
        let href = doc.location();
        Ok(href.contains(&self.needle).then_some(Payload::Value(href)))
    }
}

/// Adapts a boolean predicate into a condition.
pub struct Predicate<F>(pub F);

impl<F> Condition for Predicate<F>
where
    F: Fn(&dyn Document) -> bool + Send + Sync,
{
    fn evaluate(&self, doc: &dyn Document) -> Result<MatchResult> {
        Ok((self.0)(doc).then(|| Payload::Value(doc.location())))
    }
}
