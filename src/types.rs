use std::time::Duration;

use serde::Deserialize;

/// Default deadline for single-fire and probing watchers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default deadline for continuous watchers.
pub const DEFAULT_CONTINUOUS_TIMEOUT: Duration = Duration::from_millis(60_000);

/// How a watcher reacts once its condition matches.
///
/// - `Single`: unsubscribe, run the action once, stop.
/// - `Continuous`: run the action for every *new* match until the deadline or
///   an explicit cancel.
/// - `Probing`: like `Single`, but the action only runs after an asynchronous
///   existence probe for the matched payload succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiringPolicy {
    Single,
    Continuous,
    Probing,
}

impl Default for FiringPolicy {
    fn default() -> Self {
        FiringPolicy::Single
    }
}

impl FiringPolicy {
    /// Deadline used when a watcher does not configure one.
    pub fn default_timeout(self) -> Duration {
        match self {
            FiringPolicy::Continuous => DEFAULT_CONTINUOUS_TIMEOUT,
            FiringPolicy::Single | FiringPolicy::Probing => DEFAULT_TIMEOUT,
        }
    }
}

/// Where a new element goes relative to an existing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    /// Immediately before the target, as a sibling.
    Before,
    /// Immediately after the target, as a sibling.
    After,
    /// First child of the target.
    Prepend,
    /// Last child of the target.
    Append,
    /// In place of the target, which is removed.
    Replace,
}

impl Default for InsertPosition {
    fn default() -> Self {
        InsertPosition::After
    }
}
