#![allow(dead_code)]

use std::sync::Arc;

use pagewatch::config::{ConfigSection, RawRulesFile, RuleConfig, RulesFile};
use pagewatch::dom::{MemoryDocument, NewElement, NodeId, SharedDocument};

/// Builder for a `MemoryDocument` with some initial elements.
pub struct PageBuilder {
    url: String,
    elements: Vec<(Option<usize>, NewElement)>,
}

impl PageBuilder {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            elements: Vec::new(),
        }
    }

    /// Add an element under `<body>`.
    pub fn with(mut self, element: NewElement) -> Self {
        self.elements.push((None, element));
        self
    }

    /// Add an element under the `parent`-th element added before it.
    pub fn with_child(mut self, parent: usize, element: NewElement) -> Self {
        self.elements.push((Some(parent), element));
        self
    }

    /// Build the page; returns the document and the ids of the added elements
    /// in the order they were added.
    pub fn build(self) -> (MemoryDocument, Vec<NodeId>) {
        let doc = MemoryDocument::new(self.url);
        let mut ids: Vec<NodeId> = Vec::new();
        for (parent, element) in self.elements {
            let id = match parent {
                None => doc.append_to_body(element),
                Some(index) => doc.append(ids[index], element),
            }
            .expect("failed to build page");
            ids.push(id);
        }
        (doc, ids)
    }
}

/// Another handle to the same page, as watchers take it.
pub fn shared(doc: &MemoryDocument) -> SharedDocument {
    Arc::new(doc.clone())
}

/// Builder for `RulesFile` to simplify test setup.
pub struct RulesFileBuilder {
    raw: RawRulesFile,
}

impl RulesFileBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawRulesFile {
                config: ConfigSection::default(),
                rule: Vec::new(),
            },
        }
    }

    pub fn with_rule(mut self, rule: RuleConfig) -> Self {
        self.raw.rule.push(rule);
        self
    }

    pub fn with_default_timeout_ms(mut self, ms: u64) -> Self {
        self.raw.config.default_timeout_ms = ms;
        self
    }

    pub fn with_continuous_timeout_ms(mut self, ms: u64) -> Self {
        self.raw.config.continuous_timeout_ms = ms;
        self
    }

    pub fn raw(self) -> RawRulesFile {
        self.raw
    }

    pub fn build(self) -> RulesFile {
        RulesFile::try_from(self.raw).expect("Failed to build valid rules from builder")
    }
}

impl Default for RulesFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
