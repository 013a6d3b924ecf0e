// src/config/mod.rs

//! Rules file: TOML model, loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigSection, RawRulesFile, RuleConfig, RulesFile};
