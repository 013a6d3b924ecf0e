// src/watcher/config.rs

//! Watcher registration config.
//!
//! [`RawWatcherConfig`] is what callers build; [`WatcherConfig`] is the
//! validated form produced by `TryFrom`. Everything that can be wrong with a
//! registration is caught here, synchronously, before any feed or timer
//! exists.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actions::Action;
use crate::dom::{NodeId, Selector};
use crate::errors::{PagewatchError, Result};
use crate::probe::ExistenceProbe;
use crate::types::FiringPolicy;
use crate::watcher::ErrorSink;
use crate::watcher::condition::{
    AllPresent, ButtonWithText, Condition, ElementsMatching, LocationContains,
};

/// How the condition is described at registration time.
///
/// Selector-based variants are parsed during validation so that a malformed
/// selector rejects the registration instead of failing later.
#[derive(Clone)]
pub enum ConditionSpec {
    /// Every element matching a selector.
    Elements(String),
    /// Every element matching a selector under a given node.
    ElementsWithin(String, NodeId),
    /// First button whose text contains the given string (case-insensitive).
    ButtonText(String),
    /// First match of each selector; matches only when all are present.
    AllPresent(Vec<String>),
    /// The current location, whenever it contains the given string.
    LocationContains(String),
    Custom(Arc<dyn Condition>),
}

impl fmt::Debug for ConditionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionSpec::Elements(s) => f.debug_tuple("Elements").field(s).finish(),
            ConditionSpec::ElementsWithin(s, root) => f
                .debug_tuple("ElementsWithin")
                .field(s)
                .field(root)
                .finish(),
            ConditionSpec::ButtonText(t) => f.debug_tuple("ButtonText").field(t).finish(),
            ConditionSpec::AllPresent(s) => f.debug_tuple("AllPresent").field(s).finish(),
            ConditionSpec::LocationContains(n) => {
                f.debug_tuple("LocationContains").field(n).finish()
            }
            ConditionSpec::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl ConditionSpec {
    fn build(self) -> Result<Arc<dyn Condition>> {
        let condition: Arc<dyn Condition> = match self {
            ConditionSpec::Elements(s) => Arc::new(ElementsMatching::new(Selector::parse(&s)?)),
            ConditionSpec::ElementsWithin(s, root) => {
                Arc::new(ElementsMatching::within(Selector::parse(&s)?, root))
            }
            ConditionSpec::ButtonText(text) => {
                if text.trim().is_empty() {
                    return Err(PagewatchError::Registration(
                        "button text must not be empty".to_string(),
                    ));
                }
                Arc::new(ButtonWithText::new(text.trim()))
            }
            ConditionSpec::AllPresent(sources) => {
                if sources.is_empty() {
                    return Err(PagewatchError::Registration(
                        "all-present condition needs at least one selector".to_string(),
                    ));
                }
                let selectors = sources
                    .iter()
                    .map(|s| Selector::parse(s))
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(AllPresent::new(selectors))
            }
            ConditionSpec::LocationContains(needle) => {
                if needle.is_empty() {
                    return Err(PagewatchError::Registration(
                        "location needle must not be empty".to_string(),
                    ));
                }
                Arc::new(LocationContains::new(needle))
            }
            ConditionSpec::Custom(condition) => condition,
        };
        Ok(condition)
    }
}

/// Unvalidated registration request.
#[derive(Clone, Default)]
pub struct RawWatcherConfig {
    pub condition: Option<ConditionSpec>,
    pub policy: FiringPolicy,
    pub action: Option<Arc<dyn Action>>,
    /// Falls back to [`FiringPolicy::default_timeout`].
    pub timeout: Option<Duration>,
    /// Required for [`FiringPolicy::Probing`].
    pub probe: Option<Arc<dyn ExistenceProbe>>,
    /// Falls back to a sink that logs at `warn`.
    pub error_sink: Option<ErrorSink>,
    /// Change-feed root; defaults to the document body.
    pub root: Option<NodeId>,
    /// Name used in logs.
    pub label: Option<String>,
}

impl fmt::Debug for RawWatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawWatcherConfig")
            .field("condition", &self.condition)
            .field("policy", &self.policy)
            .field("has_action", &self.action.is_some())
            .field("timeout", &self.timeout)
            .field("has_probe", &self.probe.is_some())
            .field("root", &self.root)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl RawWatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, condition: ConditionSpec) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Shorthand for [`ConditionSpec::Elements`].
    pub fn when_selector(self, selector: impl Into<String>) -> Self {
        self.when(ConditionSpec::Elements(selector.into()))
    }

    pub fn when_condition(self, condition: impl Condition + 'static) -> Self {
        self.when(ConditionSpec::Custom(Arc::new(condition)))
    }

    pub fn policy(mut self, policy: FiringPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn then(mut self, action: impl Action + 'static) -> Self {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn then_shared(mut self, action: Arc<dyn Action>) -> Self {
        self.action = Some(action);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    pub fn probe(mut self, probe: impl ExistenceProbe + 'static) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    pub fn probe_shared(mut self, probe: Arc<dyn ExistenceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn root(mut self, root: NodeId) -> Self {
        self.root = Some(root);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Validated registration.
#[derive(Clone)]
pub struct WatcherConfig {
    pub(crate) condition: Arc<dyn Condition>,
    pub(crate) policy: FiringPolicy,
    pub(crate) action: Arc<dyn Action>,
    pub(crate) timeout: Duration,
    pub(crate) probe: Option<Arc<dyn ExistenceProbe>>,
    pub(crate) error_sink: Option<ErrorSink>,
    pub(crate) root: Option<NodeId>,
    pub(crate) label: Option<String>,
}

impl fmt::Debug for WatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherConfig")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("root", &self.root)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl WatcherConfig {
    pub fn policy(&self) -> FiringPolicy {
        self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl TryFrom<RawWatcherConfig> for WatcherConfig {
    type Error = PagewatchError;

    fn try_from(raw: RawWatcherConfig) -> std::result::Result<Self, Self::Error> {
        let Some(spec) = raw.condition else {
            return Err(PagewatchError::Registration(
                "a condition is required".to_string(),
            ));
        };
        let Some(action) = raw.action else {
            return Err(PagewatchError::Registration(
                "an action is required".to_string(),
            ));
        };
        if raw.policy == FiringPolicy::Probing && raw.probe.is_none() {
            return Err(PagewatchError::Registration(
                "probing policy requires a probe".to_string(),
            ));
        }

        let timeout = raw
            .timeout
            .unwrap_or_else(|| raw.policy.default_timeout());
        if timeout.is_zero() {
            return Err(PagewatchError::Registration(
                "timeout must be >= 1 ms (got 0)".to_string(),
            ));
        }

        Ok(WatcherConfig {
            condition: spec.build()?,
            policy: raw.policy,
            action,
            timeout,
            probe: raw.probe,
            error_sink: raw.error_sink,
            root: raw.root,
            label: raw.label,
        })
    }
}
