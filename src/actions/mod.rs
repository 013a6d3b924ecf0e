// src/actions/mod.rs

//! Action adapters.
//!
//! An [`Action`] is what a watcher does with a match. The runtime hands it the
//! payload and a shared handle to the document; the adapters here cover the
//! common page operations (click, remove, redirect, fill-and-submit, insert).
//!
//! Payload elements are snapshots. Adapters re-check each node with
//! [`Document::element`] before acting and skip nodes that have gone away.

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use crate::dom::{Document, NewElement, SharedDocument};
use crate::types::InsertPosition;
use crate::watcher::Payload;

pub mod url;

pub use url::{replace_in_url, with_domain, with_query_fragment};

pub trait Action: Send + Sync {
    fn run(&self, payload: &Payload, doc: &SharedDocument) -> Result<()>;
}

impl<F> Action for F
where
    F: Fn(&Payload, &SharedDocument) -> Result<()> + Send + Sync,
{
    fn run(&self, payload: &Payload, doc: &SharedDocument) -> Result<()> {
        self(payload, doc)
    }
}

/// Click the first matched element.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClickFirst;

impl Action for ClickFirst {
    fn run(&self, payload: &Payload, doc: &SharedDocument) -> Result<()> {
        let Some(first) = payload.first() else {
            return Err(anyhow!("click needs an element payload"));
        };
        if doc.element(first.node).is_none() {
            debug!(node = %first.node, "click target detached; skipping");
            return Ok(());
        }
        debug!(target = %first.describe(), "clicking");
        doc.click(first.node)
    }
}

/// Remove every matched element that is still attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveAll;

impl Action for RemoveAll {
    fn run(&self, payload: &Payload, doc: &SharedDocument) -> Result<()> {
        let mut removed = 0usize;
        for el in payload.elements() {
            if doc.remove(el.node) {
                removed += 1;
            }
        }
        debug!(removed, "removed matched elements");
        Ok(())
    }
}

/// Rewrite the current location by substring replacement.
///
/// The target is computed from the location at the time the action runs, not
/// from the payload, and nothing happens if it would not change the URL. With
/// a non-zero delay the navigation happens on a spawned task; the location is
/// re-read when the delay ends.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub pattern: String,
    pub replacement: String,
    pub delay: Duration,
}

impl Redirect {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn redirect_now(doc: &dyn Document, pattern: &str, replacement: &str) -> Result<()> {
    let current = doc.location();
    match replace_in_url(&current, pattern, replacement) {
        Some(next) => {
            debug!(from = %current, to = %next, "redirecting");
            doc.navigate(&next)
        }
        None => Ok(()),
    }
}

impl Action for Redirect {
    fn run(&self, _payload: &Payload, doc: &SharedDocument) -> Result<()> {
        if self.delay.is_zero() {
            return redirect_now(doc.as_ref(), &self.pattern, &self.replacement);
        }

        let doc = doc.clone();
        let pattern = self.pattern.clone();
        let replacement = self.replacement.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = redirect_now(doc.as_ref(), &pattern, &replacement) {
                warn!(error = %err, "delayed redirect failed");
            }
        });
        Ok(())
    }
}

/// Navigate to a fixed URL unless the page is already there.
#[derive(Debug, Clone)]
pub struct RedirectTo {
    pub url: String,
}

impl RedirectTo {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Action for RedirectTo {
    fn run(&self, _payload: &Payload, doc: &SharedDocument) -> Result<()> {
        if doc.location() == self.url {
            return Ok(());
        }
        doc.navigate(&self.url)
    }
}

/// Fill matched inputs in order, then click the element after the last one.
///
/// The payload must hold one element per value plus the submit control.
/// Every fill dispatches an `input` event so page scripts see the change.
#[derive(Debug, Clone)]
pub struct FillAndSubmit {
    pub values: Vec<String>,
}

impl FillAndSubmit {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

impl Action for FillAndSubmit {
    fn run(&self, payload: &Payload, doc: &SharedDocument) -> Result<()> {
        let elements = payload.elements();
        if elements.len() <= self.values.len() {
            return Err(anyhow!(
                "fill-and-submit expected {} elements, got {}",
                self.values.len() + 1,
                elements.len()
            ));
        }

        for (el, value) in elements.iter().zip(&self.values) {
            doc.set_value(el.node, value)?;
            doc.dispatch_event(el.node, "input")?;
        }

        let submit = &elements[self.values.len()];
        debug!(target = %submit.describe(), "submitting");
        doc.click(submit.node)
    }
}

/// Insert a new element relative to the first matched element.
#[derive(Debug, Clone)]
pub struct InsertElement {
    pub position: InsertPosition,
    pub element: NewElement,
}

impl InsertElement {
    pub fn new(position: InsertPosition, element: NewElement) -> Self {
        Self { position, element }
    }
}

impl Action for InsertElement {
    fn run(&self, payload: &Payload, doc: &SharedDocument) -> Result<()> {
        let Some(target) = payload.first() else {
            return Err(anyhow!("insert needs an element payload"));
        };
        if doc.element(target.node).is_none() {
            debug!(node = %target.node, "insert target detached; skipping");
            return Ok(());
        }
        doc.insert(target.node, self.position, self.element.clone())?;
        Ok(())
    }
}
