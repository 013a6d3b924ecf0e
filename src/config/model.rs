// src/config/model.rs

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::types::{DEFAULT_CONTINUOUS_TIMEOUT, DEFAULT_TIMEOUT};

/// Rules file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// default_timeout_ms = 30000
/// continuous_timeout_ms = 60000
///
/// [[rule]]
/// kind = "click"
/// selector = "#accept"
///
/// [[rule]]
/// kind = "redirect"
/// match = "/old/"
/// replace = "/new/"
/// ```
///
/// All sections are optional at this stage; validation requires at least one
/// rule.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRulesFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All `[[rule]]` entries, in file order.
    #[serde(default)]
    pub rule: Vec<RuleConfig>,
}

/// Validated rules file. Only obtainable through `TryFrom<RawRulesFile>`.
#[derive(Debug, Clone)]
pub struct RulesFile {
    pub config: ConfigSection,
    pub rules: Vec<RuleConfig>,
}

impl RulesFile {
    pub(crate) fn new_unchecked(config: ConfigSection, rules: Vec<RuleConfig>) -> Self {
        Self { config, rules }
    }
}

/// `[config]` section: deadlines used by rules that do not set `timeout_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Single-fire and probing rules.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Continuous rules (`remove`, `redirect`).
    #[serde(default = "default_continuous_timeout_ms")]
    pub continuous_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_continuous_timeout_ms() -> u64 {
    DEFAULT_CONTINUOUS_TIMEOUT.as_millis() as u64
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            continuous_timeout_ms: default_continuous_timeout_ms(),
        }
    }
}

fn default_quality_selector() -> String {
    "[data-value]".to_string()
}

fn default_quality_attribute() -> String {
    "data-value".to_string()
}

fn default_quality_lower() -> i64 {
    10
}

fn default_quality_upper() -> i64 {
    1080
}

fn default_cookie_days() -> u64 {
    365
}

/// One `[[rule]]` entry, selected by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    /// Click the first match of `selector` once it exists.
    Click {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Click the first button whose text contains `text`.
    ClickText {
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Remove every match of `selector`, now and as they appear.
    Remove {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Rewrite the location while it contains `match`.
    Redirect {
        #[serde(rename = "match")]
        pattern: String,
        replace: String,
        #[serde(default)]
        delay_ms: u64,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fill a login form once all of its parts exist.
    Login {
        user_selector: String,
        pass_selector: String,
        button_selector: String,
        user: String,
        pass: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Pick the highest quality option in `(lower, upper]`.
    Quality {
        #[serde(default = "default_quality_selector")]
        selector: String,
        #[serde(default = "default_quality_attribute")]
        attribute: String,
        #[serde(default = "default_quality_lower")]
        lower: i64,
        #[serde(default = "default_quality_upper")]
        upper: i64,
        #[serde(default)]
        follow_up: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Probe alternative video qualities and link the ones that exist.
    QualityLinks {
        below: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Make sure the URL carries a query fragment (acts once, immediately).
    EnsureQuery { fragment: String },

    /// Merge `values` into a JSON object in local storage.
    Storage { key: String, values: Map<String, Value> },

    /// Set cookie `name`, or refresh its expiry when `value` is omitted.
    Cookie {
        name: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default = "default_cookie_days")]
        days: u64,
    },
}

impl RuleConfig {
    /// The `kind` tag as written in the file.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleConfig::Click { .. } => "click",
            RuleConfig::ClickText { .. } => "click_text",
            RuleConfig::Remove { .. } => "remove",
            RuleConfig::Redirect { .. } => "redirect",
            RuleConfig::Login { .. } => "login",
            RuleConfig::Quality { .. } => "quality",
            RuleConfig::QualityLinks { .. } => "quality_links",
            RuleConfig::EnsureQuery { .. } => "ensure_query",
            RuleConfig::Storage { .. } => "storage",
            RuleConfig::Cookie { .. } => "cookie",
        }
    }

    /// Explicit `timeout_ms`, if the rule kind has one and it is set.
    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            RuleConfig::Click { timeout_ms, .. }
            | RuleConfig::ClickText { timeout_ms, .. }
            | RuleConfig::Remove { timeout_ms, .. }
            | RuleConfig::Redirect { timeout_ms, .. }
            | RuleConfig::Login { timeout_ms, .. }
            | RuleConfig::Quality { timeout_ms, .. }
            | RuleConfig::QualityLinks { timeout_ms, .. } => *timeout_ms,
            RuleConfig::EnsureQuery { .. } | RuleConfig::Storage { .. } | RuleConfig::Cookie { .. } => {
                None
            }
        }
    }

    /// `false` for rules that act once at startup.
    pub fn registers_watcher(&self) -> bool {
        !matches!(
            self,
            RuleConfig::EnsureQuery { .. } | RuleConfig::Storage { .. } | RuleConfig::Cookie { .. }
        )
    }

    /// Whether the rule registers a continuous watcher.
    pub fn is_continuous(&self) -> bool {
        matches!(self, RuleConfig::Remove { .. } | RuleConfig::Redirect { .. })
    }
}
