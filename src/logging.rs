// src/logging.rs

//! Logging setup for `pagewatch` using `tracing` + `tracing-subscriber`.
//!
//! The level comes from `--log-level`, then `PAGEWATCH_LOG` (e.g. "debug"),
//! then defaults to `info`. Logs go to STDERR; the replay journal is printed
//! on stdout.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

const LOG_ENV: &str = "PAGEWATCH_LOG";

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = cli_level.map(Level::from).unwrap_or_else(env_level);

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Level from `PAGEWATCH_LOG`; unset or unparsable values mean `info`.
fn env_level() -> Level {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(Level::INFO)
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
