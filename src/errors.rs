// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PagewatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Watcher registration rejected: {0}")]
    Registration(String),

    #[error("Condition failed: {0}")]
    Condition(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PagewatchError {
    pub(crate) fn invalid_selector(selector: &str, reason: impl Into<String>) -> Self {
        PagewatchError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PagewatchError>;
