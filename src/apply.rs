// src/apply.rs

//! Turns validated rules into registered watchers.
//!
//! Watcher rules become one watcher (or a group) each. `ensure_query`,
//! `storage` and `cookie` rules act once, immediately, and register nothing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{ConfigSection, RuleConfig, RulesFile};
use crate::dom::SharedDocument;
use crate::errors::Result;
use crate::probe::ExistenceProbe;
use crate::recipes::{
    self, LOGIN_TIMEOUT, LoginForm, QUALITY_LINKS_TIMEOUT, QualityLinks, QualityPicker,
};
use crate::storage;
use crate::watcher::WatcherGroup;

/// Deadline for a rule: its own `timeout_ms`, else the recipe's default, else
/// the `[config]` default for its policy.
pub fn rule_timeout(rule: &RuleConfig, cfg: &ConfigSection) -> Duration {
    if let Some(ms) = rule.timeout_ms() {
        return Duration::from_millis(ms);
    }
    match rule {
        RuleConfig::Login { .. } => LOGIN_TIMEOUT,
        RuleConfig::QualityLinks { .. } => QUALITY_LINKS_TIMEOUT,
        r if r.is_continuous() => Duration::from_millis(cfg.continuous_timeout_ms),
        _ => Duration::from_millis(cfg.default_timeout_ms),
    }
}

/// Register every rule against `doc`, in file order.
///
/// `probe` is used by `quality_links` rules.
pub fn register_rules(
    doc: &SharedDocument,
    rules: &RulesFile,
    probe: Arc<dyn ExistenceProbe>,
) -> Result<WatcherGroup> {
    let mut group = WatcherGroup::new();

    for rule in &rules.rules {
        let timeout = rule_timeout(rule, &rules.config);
        debug!(kind = rule.kind(), timeout_ms = timeout.as_millis() as u64, "applying rule");

        match rule {
            RuleConfig::Click { selector, .. } => {
                group.push(recipes::click_when_exists(doc, selector, Some(timeout))?);
            }
            RuleConfig::ClickText { text, .. } => {
                group.push(recipes::click_button_by_text(doc, text, Some(timeout))?);
            }
            RuleConfig::Remove { selector, .. } => {
                group.push(recipes::remove_on_appear(doc, selector, None, Some(timeout))?);
            }
            RuleConfig::Redirect {
                pattern,
                replace,
                delay_ms,
                ..
            } => {
                group.push(recipes::redirect_on_url_match(
                    doc,
                    pattern,
                    replace,
                    Duration::from_millis(*delay_ms),
                    Some(timeout),
                )?);
            }
            RuleConfig::Login {
                user_selector,
                pass_selector,
                button_selector,
                user,
                pass,
                ..
            } => {
                let form = LoginForm {
                    user_selector: user_selector.clone(),
                    pass_selector: pass_selector.clone(),
                    button_selector: button_selector.clone(),
                    user_value: user.clone(),
                    pass_value: pass.clone(),
                    timeout,
                };
                group.push(recipes::auto_login(doc, &form)?);
            }
            RuleConfig::Quality {
                selector,
                attribute,
                lower,
                upper,
                follow_up,
                ..
            } => {
                let picker = QualityPicker {
                    selector: selector.clone(),
                    attribute: attribute.clone(),
                    lower: *lower,
                    upper: *upper,
                    follow_up: follow_up.clone(),
                    timeout: Some(timeout),
                    ..QualityPicker::default()
                };
                group.push(recipes::select_highest_quality(doc, &picker)?);
            }
            RuleConfig::QualityLinks { below, .. } => {
                let options = QualityLinks {
                    timeout,
                    ..QualityLinks::new(below.clone())
                };
                group.extend(recipes::add_quality_links(doc, &options, probe.clone())?);
            }
            RuleConfig::EnsureQuery { fragment } => {
                recipes::ensure_url_has(doc.as_ref(), fragment)?;
            }
            RuleConfig::Storage { key, values } => {
                storage::update_local_storage_object(doc.as_ref(), key, values.clone());
            }
            RuleConfig::Cookie { name, value, days } => match value {
                Some(value) => storage::set_cookie(doc.as_ref(), name, value, *days),
                None => {
                    storage::copy_cookie(doc.as_ref(), name, *days);
                }
            },
        }
    }

    info!(rules = rules.rules.len(), watchers = group.len(), "rules applied");
    Ok(group)
}
