// src/config/validate.rs

use crate::config::model::{ConfigSection, RawRulesFile, RuleConfig, RulesFile};
use crate::dom::Selector;
use crate::errors::{PagewatchError, Result};

impl TryFrom<RawRulesFile> for RulesFile {
    type Error = crate::errors::PagewatchError;

    fn try_from(raw: RawRulesFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_rules(&raw)?;
        Ok(RulesFile::new_unchecked(raw.config, raw.rule))
    }
}

fn validate_raw_rules(raw: &RawRulesFile) -> Result<()> {
    ensure_has_rules(raw)?;
    validate_global_config(&raw.config)?;
    for (index, rule) in raw.rule.iter().enumerate() {
        validate_rule(index, rule)?;
    }
    Ok(())
}

fn ensure_has_rules(raw: &RawRulesFile) -> Result<()> {
    if raw.rule.is_empty() {
        return Err(PagewatchError::ConfigError(
            "rules file must contain at least one [[rule]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &ConfigSection) -> Result<()> {
    if cfg.default_timeout_ms == 0 {
        return Err(PagewatchError::ConfigError(
            "[config].default_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.continuous_timeout_ms == 0 {
        return Err(PagewatchError::ConfigError(
            "[config].continuous_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn rule_error(index: usize, rule: &RuleConfig, msg: impl AsRef<str>) -> PagewatchError {
    PagewatchError::ConfigError(format!(
        "rule #{} ({}): {}",
        index + 1,
        rule.kind(),
        msg.as_ref()
    ))
}

fn require_non_empty(index: usize, rule: &RuleConfig, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(rule_error(index, rule, format!("`{field}` must not be empty")));
    }
    Ok(())
}

fn validate_rule(index: usize, rule: &RuleConfig) -> Result<()> {
    if rule.timeout_ms() == Some(0) {
        return Err(rule_error(index, rule, "`timeout_ms` must be >= 1 (got 0)"));
    }

    match rule {
        RuleConfig::Click { selector, .. } | RuleConfig::Remove { selector, .. } => {
            Selector::parse(selector)?;
        }
        RuleConfig::ClickText { text, .. } => require_non_empty(index, rule, "text", text)?,
        RuleConfig::Redirect {
            pattern, replace, ..
        } => {
            require_non_empty(index, rule, "match", pattern)?;
            require_non_empty(index, rule, "replace", replace)?;
        }
        RuleConfig::Login {
            user_selector,
            pass_selector,
            button_selector,
            ..
        } => {
            for selector in [user_selector, pass_selector, button_selector] {
                Selector::parse(selector)?;
            }
        }
        RuleConfig::Quality {
            selector,
            attribute,
            lower,
            upper,
            follow_up,
            ..
        } => {
            Selector::parse(selector)?;
            require_non_empty(index, rule, "attribute", attribute)?;
            if lower >= upper {
                return Err(rule_error(
                    index,
                    rule,
                    format!("`lower` must be less than `upper` (got {lower} and {upper})"),
                ));
            }
            if let Some(follow_up) = follow_up {
                Selector::parse(follow_up)?;
            }
        }
        RuleConfig::QualityLinks { below, .. } => {
            Selector::parse(below)?;
        }
        RuleConfig::EnsureQuery { fragment } => {
            require_non_empty(index, rule, "fragment", fragment)?;
        }
        RuleConfig::Storage { key, .. } => require_non_empty(index, rule, "key", key)?,
        RuleConfig::Cookie { name, .. } => require_non_empty(index, rule, "name", name)?,
    }
    Ok(())
}
