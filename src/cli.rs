// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `pagewatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pagewatch",
    version,
    about = "Replay a page fixture headlessly and run condition-triggered watchers against it.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the rules file (TOML).
    ///
    /// Default: `Pagewatch.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Pagewatch.toml")]
    pub config: String,

    /// Path to the page fixture (TOML). Not needed with `--dry-run`.
    #[arg(long, value_name = "PATH", required_unless_present = "dry_run")]
    pub page: Option<String>,

    /// Stop the replay after this many milliseconds.
    ///
    /// Default: one second after the fixture's last event.
    #[arg(long, value_name = "MS")]
    pub until_ms: Option<u64>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PAGEWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the rules, but don't replay anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
