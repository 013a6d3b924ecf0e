// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawRulesFile, RulesFile};
use crate::errors::Result;

/// Load a rules file from a given path and return the raw `RawRulesFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (selectors, bounds, timeouts). Use [`load_and_validate`] for
/// that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawRulesFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let rules: RawRulesFile = toml::from_str(&contents)?;

    Ok(rules)
}

/// Load a rules file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks for:
///   - at least one rule,
///   - timeouts of at least 1 ms,
///   - selectors that parse,
///   - non-empty redirect patterns and sane quality bounds.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<RulesFile> {
    let raw = load_from_path(&path)?;
    let rules = RulesFile::try_from(raw)?;
    Ok(rules)
}
