// src/recipes.rs

//! Ready-made watchers for common page chores.
//!
//! Every recipe is a single [`register_watcher`] call with a particular
//! condition, policy and action (or a [`WatcherGroup`] of such calls). None of
//! them carries control flow of its own. The two location helpers at the end
//! act immediately and register nothing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use regex::Regex;
use tracing::{debug, warn};

use crate::actions::{
    Action, ClickFirst, FillAndSubmit, Redirect, RemoveAll, with_domain, with_query_fragment,
};
use crate::dom::{Document, Element, NewElement, NodeId, Selector, SharedDocument};
use crate::errors::{PagewatchError, Result};
use crate::probe::ExistenceProbe;
use crate::storage::{leading_int, read_preference};
use crate::types::{FiringPolicy, InsertPosition};
use crate::watcher::condition::{Condition, Predicate};
use crate::watcher::{
    ConditionSpec, MatchResult, Payload, RawWatcherConfig, WatcherGroup, WatcherHandle,
    register_watcher,
};

/// Default deadline for [`auto_login`].
pub const LOGIN_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default deadline for [`add_quality_links`].
pub const QUALITY_LINKS_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Delay before the follow-up click of [`select_highest_quality`].
pub const FOLLOW_UP_DELAY: Duration = Duration::from_millis(600);

fn timed(raw: RawWatcherConfig, timeout: Option<Duration>) -> RawWatcherConfig {
    match timeout {
        Some(t) => raw.timeout(t),
        None => raw,
    }
}

/// Click the first element matching `selector` once it exists.
pub fn click_when_exists(
    doc: &SharedDocument,
    selector: &str,
    timeout: Option<Duration>,
) -> Result<WatcherHandle> {
    let raw = RawWatcherConfig::new()
        .when_selector(selector)
        .then(ClickFirst)
        .label(format!("click {selector}"));
    register_watcher(doc.clone(), timed(raw, timeout))
}

/// Click the first `<button>` whose text contains `text`, ignoring case.
pub fn click_button_by_text(
    doc: &SharedDocument,
    text: &str,
    timeout: Option<Duration>,
) -> Result<WatcherHandle> {
    let raw = RawWatcherConfig::new()
        .when(ConditionSpec::ButtonText(text.to_string()))
        .then(ClickFirst)
        .label(format!("click button '{text}'"));
    register_watcher(doc.clone(), timed(raw, timeout))
}

/// One [`click_when_exists`] per selector.
///
/// Every selector is parsed before anything is registered, so a bad one
/// rejects the whole group.
pub fn click_multiple_when_exists<I, S>(
    doc: &SharedDocument,
    selectors: I,
    timeout: Option<Duration>,
) -> Result<WatcherGroup>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let selectors: Vec<String> = selectors
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect();
    for s in &selectors {
        Selector::parse(s)?;
    }

    selectors
        .iter()
        .map(|s| click_when_exists(doc, s, timeout))
        .collect()
}

/// Remove every element matching `selector` now and whenever a new one
/// appears, until the deadline (60 s by default) or cancel.
pub fn remove_on_appear(
    doc: &SharedDocument,
    selector: &str,
    root: Option<NodeId>,
    timeout: Option<Duration>,
) -> Result<WatcherHandle> {
    let condition = match root {
        Some(root) => ConditionSpec::ElementsWithin(selector.to_string(), root),
        None => ConditionSpec::Elements(selector.to_string()),
    };
    let mut raw = RawWatcherConfig::new()
        .when(condition)
        .policy(FiringPolicy::Continuous)
        .then(RemoveAll)
        .label(format!("remove {selector}"));
    if let Some(root) = root {
        raw = raw.root(root);
    }
    register_watcher(doc.clone(), timed(raw, timeout))
}

/// Run `callback` once `predicate` holds.
pub fn observe_until<P, F>(
    doc: &SharedDocument,
    predicate: P,
    callback: F,
    timeout: Option<Duration>,
) -> Result<WatcherHandle>
where
    P: Fn(&dyn Document) -> bool + Send + Sync + 'static,
    F: Fn(&SharedDocument) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let raw = RawWatcherConfig::new()
        .when_condition(Predicate(predicate))
        .then(move |_: &Payload, doc: &SharedDocument| callback(doc))
        .label("observe-until");
    register_watcher(doc.clone(), timed(raw, timeout))
}

/// Run `callback` with every element matching `selector` once there is at
/// least one.
pub fn observe_until_found<F>(
    doc: &SharedDocument,
    selector: &str,
    callback: F,
    timeout: Option<Duration>,
) -> Result<WatcherHandle>
where
    F: Fn(&[Element]) -> anyhow::Result<()> + Send + Sync + 'static,
{
    let raw = RawWatcherConfig::new()
        .when_selector(selector)
        .then(move |payload: &Payload, _: &SharedDocument| callback(payload.elements()))
        .label(format!("observe {selector}"));
    register_watcher(doc.clone(), timed(raw, timeout))
}

/// Keep rewriting the location while it contains `pattern`.
///
/// Runs on registration and again on every navigation. With a non-zero
/// `delay`, each redirect happens that long after the match.
pub fn redirect_on_url_match(
    doc: &SharedDocument,
    pattern: &str,
    replacement: &str,
    delay: Duration,
    timeout: Option<Duration>,
) -> Result<WatcherHandle> {
    if pattern.is_empty() || replacement.is_empty() {
        return Err(PagewatchError::Registration(
            "redirect needs a non-empty match and replacement".to_string(),
        ));
    }
    let raw = RawWatcherConfig::new()
        .when(ConditionSpec::LocationContains(pattern.to_string()))
        .policy(FiringPolicy::Continuous)
        .then(Redirect::new(pattern, replacement).with_delay(delay))
        .label(format!("redirect {pattern} -> {replacement}"));
    register_watcher(doc.clone(), timed(raw, timeout))
}

/// Selectors and values for [`auto_login`].
#[derive(Debug, Clone)]
pub struct LoginForm {
    pub user_selector: String,
    pub pass_selector: String,
    pub button_selector: String,
    pub user_value: String,
    pub pass_value: String,
    pub timeout: Duration,
}

/// Once the user field, password field and button all exist, fill both
/// fields and click the button.
pub fn auto_login(doc: &SharedDocument, form: &LoginForm) -> Result<WatcherHandle> {
    let raw = RawWatcherConfig::new()
        .when(ConditionSpec::AllPresent(vec![
            form.user_selector.clone(),
            form.pass_selector.clone(),
            form.button_selector.clone(),
        ]))
        .then(FillAndSubmit::new([&form.user_value, &form.pass_value]))
        .timeout(form.timeout)
        .label("auto-login");
    register_watcher(doc.clone(), raw)
}

/// Options for [`select_highest_quality`].
#[derive(Debug, Clone)]
pub struct QualityPicker {
    pub selector: String,
    pub attribute: String,
    /// Exclusive lower bound.
    pub lower: i64,
    /// Inclusive upper bound.
    pub upper: i64,
    pub preference_key: String,
    pub preference_field: String,
    /// Element to click after choosing, e.g. the player, to apply the choice.
    pub follow_up: Option<String>,
    pub follow_up_delay: Duration,
    pub timeout: Option<Duration>,
}

impl Default for QualityPicker {
    fn default() -> Self {
        Self {
            selector: "[data-value]".to_string(),
            attribute: "data-value".to_string(),
            lower: 10,
            upper: 1080,
            preference_key: "x-player-settings".to_string(),
            preference_field: "quality".to_string(),
            follow_up: None,
            follow_up_delay: FOLLOW_UP_DELAY,
            timeout: None,
        }
    }
}

/// Largest value in `(lower, upper]`.
pub fn pick_highest(values: impl IntoIterator<Item = i64>, lower: i64, upper: i64) -> Option<i64> {
    values
        .into_iter()
        .filter(|v| *v > lower && *v <= upper)
        .max()
}

struct HighestQuality {
    candidates: Selector,
    attribute: String,
    lower: i64,
    upper: i64,
    preference_key: String,
    preference_field: String,
}

impl HighestQuality {
    fn value_of(&self, el: &Element) -> Option<i64> {
        el.attr(&self.attribute).and_then(leading_int)
    }
}

impl Condition for HighestQuality {
    fn evaluate(&self, doc: &dyn Document) -> anyhow::Result<MatchResult> {
        let elements = doc.query_all(&self.candidates);
        let values = elements.iter().filter_map(|el| self.value_of(el));
        let Some(best) = pick_highest(values, self.lower, self.upper) else {
            return Ok(None);
        };

        if read_preference(doc, &self.preference_key, &self.preference_field) == Some(best) {
            debug!(best, "preferred quality already selected");
            return Ok(None);
        }

        // `data-value="720"` wins over `data-value="720p"`.
        let exact = best.to_string();
        let chosen = elements
            .iter()
            .position(|el| el.attr(&self.attribute) == Some(exact.as_str()))
            .or_else(|| elements.iter().position(|el| self.value_of(el) == Some(best)));
        Ok(chosen.map(|i| Payload::Elements(vec![elements[i].clone()])))
    }
}

/// Click the highest-valued quality option in range, unless it is already
/// the stored preference.
pub fn select_highest_quality(
    doc: &SharedDocument,
    picker: &QualityPicker,
) -> Result<WatcherHandle> {
    if picker.lower >= picker.upper {
        return Err(PagewatchError::Registration(format!(
            "quality bounds must satisfy lower < upper (got {} and {})",
            picker.lower, picker.upper
        )));
    }

    let condition = HighestQuality {
        candidates: Selector::parse(&picker.selector)?,
        attribute: picker.attribute.clone(),
        lower: picker.lower,
        upper: picker.upper,
        preference_key: picker.preference_key.clone(),
        preference_field: picker.preference_field.clone(),
    };
    let follow_up = picker
        .follow_up
        .as_deref()
        .map(Selector::parse)
        .transpose()?;
    let delay = picker.follow_up_delay;

    let action = move |payload: &Payload, doc: &SharedDocument| -> anyhow::Result<()> {
        ClickFirst.run(payload, doc)?;
        if let Some(selector) = follow_up.clone() {
            let doc = doc.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(el) = doc.query(&selector) {
                    if let Err(err) = doc.click(el.node) {
                        warn!(error = %err, "follow-up click failed");
                    }
                }
            });
        }
        Ok(())
    };

    let raw = RawWatcherConfig::new()
        .when_condition(condition)
        .then(action)
        .label("select-highest-quality");
    register_watcher(doc.clone(), timed(raw, picker.timeout))
}

/// A link label and its colour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityLabel {
    pub label: String,
    pub color: String,
}

impl QualityLabel {
    pub fn new(label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: color.into(),
        }
    }
}

/// Options for [`add_quality_links`].
#[derive(Debug, Clone)]
pub struct QualityLinks {
    /// Links are inserted right after the first element matching this.
    pub below_selector: String,
    pub labels: Vec<QualityLabel>,
    pub timeout: Duration,
}

impl QualityLinks {
    pub fn new(below_selector: impl Into<String>) -> Self {
        Self {
            below_selector: below_selector.into(),
            labels: vec![
                QualityLabel::new("1080p", "#28a745"),
                QualityLabel::new("720p", "#fd7e14"),
                QualityLabel::new("480p", "#007bff"),
            ],
            timeout: QUALITY_LINKS_TIMEOUT,
        }
    }
}

const QUALITY_PATTERN: &str = "480p|720p|1080p";

/// Candidate URL for one label, derived from the current video source.
struct VideoVariant {
    target: Selector,
    sources: Selector,
    videos: Selector,
    pattern: Regex,
    label: String,
}

impl Condition for VideoVariant {
    fn evaluate(&self, doc: &dyn Document) -> anyhow::Result<MatchResult> {
        if doc.query(&self.target).is_none() {
            return Ok(None);
        }
        let src = doc
            .query(&self.sources)
            .or_else(|| doc.query(&self.videos))
            .and_then(|el| el.attr("src").map(str::to_string))
            .filter(|src| !src.is_empty());
        let Some(src) = src else {
            return Ok(None);
        };
        if !self.pattern.is_match(&src) {
            return Ok(None);
        }
        let candidate = self.pattern.replace(&src, self.label.as_str()).into_owned();
        Ok(Some(Payload::Value(candidate)))
    }
}

/// Inserts `<a href=... target=_blank>label</a>` after the target.
struct QualityLink {
    target: Selector,
    label: QualityLabel,
}

impl Action for QualityLink {
    fn run(&self, payload: &Payload, doc: &SharedDocument) -> anyhow::Result<()> {
        let href = payload
            .value()
            .ok_or_else(|| anyhow!("quality link needs a URL payload"))?;
        let Some(target) = doc.query(&self.target) else {
            debug!(target = %self.target, "quality link target gone");
            return Ok(());
        };
        let link = NewElement::new("a")
            .attr("href", href)
            .attr("target", "_blank")
            .attr(
                "style",
                format!("color: {}; margin: 4px; display: inline-block", self.label.color),
            )
            .text(self.label.label.clone());
        doc.insert(target.node, InsertPosition::After, link)?;
        Ok(())
    }
}

/// For each label, probe the matching variant of the video source and, if it
/// exists, add a link to it after `below_selector`.
pub fn add_quality_links(
    doc: &SharedDocument,
    options: &QualityLinks,
    probe: Arc<dyn ExistenceProbe>,
) -> Result<WatcherGroup> {
    if options.labels.is_empty() {
        return Err(PagewatchError::Registration(
            "quality links need at least one label".to_string(),
        ));
    }
    let target = Selector::parse(&options.below_selector)?;
    let sources = Selector::parse("video source[src]")?;
    let videos = Selector::parse("video[src]")?;
    let pattern = Regex::new(QUALITY_PATTERN)
        .map_err(|e| PagewatchError::ConfigError(format!("quality pattern: {e}")))?;

    options
        .labels
        .iter()
        .map(|label| {
            let raw = RawWatcherConfig::new()
                .when_condition(VideoVariant {
                    target: target.clone(),
                    sources: sources.clone(),
                    videos: videos.clone(),
                    pattern: pattern.clone(),
                    label: label.label.clone(),
                })
                .policy(FiringPolicy::Probing)
                .probe_shared(probe.clone())
                .then(QualityLink {
                    target: target.clone(),
                    label: label.clone(),
                })
                .timeout(options.timeout)
                .label(format!("quality link {}", label.label));
            register_watcher(doc.clone(), raw)
        })
        .collect()
}

/// Move the page to `domain`, keeping path and query. Returns whether it
/// navigated.
pub fn redirect_to_domain(doc: &dyn Document, domain: &str) -> anyhow::Result<bool> {
    match with_domain(&doc.location(), domain) {
        Some(next) => {
            doc.navigate(&next)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Add `fragment` to the query string unless the URL already contains it.
/// Returns whether it navigated.
pub fn ensure_url_has(doc: &dyn Document, fragment: &str) -> anyhow::Result<bool> {
    match with_query_fragment(&doc.location(), fragment) {
        Some(next) => {
            doc.navigate(&next)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
