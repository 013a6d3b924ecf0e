// src/watcher/policy.rs

//! Firing policies.
//!
//! Given a match, decide what the watcher does with it:
//! - single-fire and probing watchers act on the first match and stop;
//! - continuous watchers act only on the part of a match they have not acted
//!   on yet, so a persistent match does not re-fire on every unrelated
//!   mutation.

use std::collections::HashSet;

use crate::dom::{Element, NodeId};
use crate::types::FiringPolicy;
use crate::watcher::{Payload, WatchCommand};

/// Memory of what a continuous watcher already acted on.
///
/// Element payloads are tracked per node; value payloads by the last value
/// acted on. When the condition stops matching, or an element drops out of the
/// match, it is forgotten, so a later re-appearance fires again.
#[derive(Debug, Clone, Default)]
pub struct Dedup {
    acted: HashSet<NodeId>,
    last_value: Option<String>,
}

impl Dedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the part of `payload` not acted on yet, recording it as acted.
    pub fn fresh(&mut self, payload: Payload) -> Option<Payload> {
        match payload {
            Payload::Elements(elements) => {
                let current: HashSet<NodeId> = elements.iter().map(|e| e.node).collect();
                self.acted.retain(|node| current.contains(node));

                let fresh: Vec<Element> = elements
                    .into_iter()
                    .filter(|e| self.acted.insert(e.node))
                    .collect();
                if fresh.is_empty() {
                    None
                } else {
                    Some(Payload::Elements(fresh))
                }
            }
            Payload::Value(value) => {
                if self.last_value.as_deref() == Some(value.as_str()) {
                    return None;
                }
                self.last_value = Some(value.clone());
                Some(Payload::Value(value))
            }
        }
    }

    /// The condition no longer matches anything.
    pub fn reset(&mut self) {
        self.acted.clear();
        self.last_value = None;
    }
}

/// What the policy wants done with a match.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Command to run for this match, if any.
    pub command: Option<WatchCommand>,
    /// Whether the watcher is done after this match.
    pub terminal: bool,
}

/// Apply `policy` to a match.
pub fn decide(policy: FiringPolicy, dedup: &mut Dedup, payload: Payload) -> Decision {
    match policy {
        FiringPolicy::Single => Decision {
            command: Some(WatchCommand::Fire(payload)),
            terminal: true,
        },
        FiringPolicy::Probing => Decision {
            command: Some(WatchCommand::Probe(payload)),
            terminal: true,
        },
        FiringPolicy::Continuous => Decision {
            command: dedup.fresh(payload).map(WatchCommand::Fire),
            terminal: false,
        },
    }
}
