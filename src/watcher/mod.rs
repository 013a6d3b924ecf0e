// src/watcher/mod.rs

//! Condition-triggered watchers.
//!
//! A watcher waits for a [`Condition`] to match against a continuously
//! changing document, fires an action according to its [`FiringPolicy`], and
//! releases its change feed and deadline timer whatever way it ends.
//!
//! The lifecycle and firing semantics live in the pure [`core::WatcherCore`];
//! it consumes [`WatchEvent`]s and returns [`WatchCommand`]s without touching
//! tokio, the document, or any callback. The async shell in [`runtime`]
//! evaluates conditions, executes the commands and owns the resources.
//!
//! [`FiringPolicy`]: crate::types::FiringPolicy

use std::fmt;

use crate::dom::Element;

pub mod condition;
pub mod config;
pub mod core;
pub mod policy;
pub mod runtime;

pub use condition::Condition;
pub use config::{ConditionSpec, RawWatcherConfig, WatcherConfig};
pub use self::core::WatcherCore;
pub use policy::Dedup;
pub use runtime::{ErrorSink, WatcherGroup, WatcherHandle, register_watcher};

/// Identifier used in logs and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(pub u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher-{}", self.0)
    }
}

/// Lifecycle of a watcher.
///
/// `Created -> Observing -> {Fired, TimedOut, Cancelled, Faulted}`.
/// Continuous watchers stay in `Observing` after each firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Observing,
    Fired,
    TimedOut,
    Cancelled,
    /// A condition or action raised; cleaned up like `TimedOut`.
    Faulted,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Lifecycle::Fired | Lifecycle::TimedOut | Lifecycle::Cancelled | Lifecycle::Faulted
        )
    }
}

/// What a condition matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Matched elements in document order.
    Elements(Vec<Element>),
    /// A derived value such as the current URL.
    Value(String),
}

impl Payload {
    /// First matched element, if this is an element payload.
    pub fn first(&self) -> Option<&Element> {
        match self {
            Payload::Elements(els) => els.first(),
            Payload::Value(_) => None,
        }
    }

    pub fn elements(&self) -> &[Element] {
        match self {
            Payload::Elements(els) => els,
            Payload::Value(_) => &[],
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Payload::Value(v) => Some(v),
            Payload::Elements(_) => None,
        }
    }
}

/// Result of evaluating a condition: `None` means no match.
pub type MatchResult = Option<Payload>;

/// Inputs to the core state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Registration: result of the mandatory eager evaluation.
    Started { outcome: MatchResult },
    /// A change-feed batch arrived and the condition was re-evaluated.
    Changed { outcome: MatchResult },
    DeadlineElapsed,
    CancelRequested,
    /// A condition or action raised.
    Faulted,
}

/// Outputs of the core state machine, executed in order by the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchCommand {
    Subscribe,
    ArmDeadline,
    Unsubscribe,
    ClearDeadline,
    /// Run the action with this payload now.
    Fire(Payload),
    /// Probe this payload; run the action only if the probe succeeds.
    Probe(Payload),
}
