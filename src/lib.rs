// src/lib.rs

pub mod actions;
pub mod apply;
pub mod cli;
pub mod config;
pub mod dom;
pub mod errors;
pub mod feed;
pub mod fixture;
pub mod logging;
pub mod probe;
pub mod recipes;
pub mod storage;
pub mod types;
pub mod watcher;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::apply::{register_rules, rule_timeout};
use crate::cli::CliArgs;
use crate::config::{RulesFile, load_and_validate};
use crate::dom::{MemoryDocument, SharedDocument};
use crate::fixture::{build_document, load_fixture, replay_timeline};
use crate::probe::{ExistenceProbe, HttpProbe};
use crate::watcher::WatcherGroup;

pub use crate::watcher::{RawWatcherConfig, WatcherHandle, register_watcher};

/// Grace period after the last fixture event when `--until-ms` is not given.
const SETTLE_AFTER_LAST_EVENT_MS: u64 = 1_000;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - rules loading
/// - page fixture loading and document construction
/// - watcher registration
/// - timeline replay
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let rules = load_and_validate(&args.config)
        .with_context(|| format!("loading rules file at {:?}", args.config))?;

    if args.dry_run {
        print_dry_run(&rules);
        return Ok(());
    }

    let page_path = args
        .page
        .as_deref()
        .ok_or_else(|| anyhow!("--page is required unless --dry-run is given"))?;
    let fixture = load_fixture(page_path)
        .with_context(|| format!("loading page fixture at {page_path:?}"))?;
    let page = build_document(&fixture)?;
    let doc: SharedDocument = Arc::new(page.clone());

    let until = Duration::from_millis(
        args.until_ms
            .unwrap_or(fixture.last_event_ms() + SETTLE_AFTER_LAST_EVENT_MS),
    );
    info!(
        url = %fixture.url,
        events = fixture.events.len(),
        until_ms = until.as_millis() as u64,
        "replaying page"
    );

    let probe: Arc<dyn ExistenceProbe> = Arc::new(HttpProbe::new()?);
    let watchers = register_rules(&doc, &rules, probe)?;
    let replay = tokio::spawn(replay_timeline(page.clone(), fixture));

    tokio::select! {
        _ = tokio::time::sleep(until) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                eprintln!("failed to listen for Ctrl+C: {e}");
            }
            info!("interrupted; stopping replay");
        }
    }

    replay.abort();
    print_report(&page, &watchers);
    watchers.cancel_all();
    Ok(())
}

/// Journal of what the watchers did to the page, then each watcher's state.
fn print_report(page: &MemoryDocument, watchers: &WatcherGroup) {
    let journal = page.journal();
    println!("journal ({} entries):", journal.len());
    for entry in &journal {
        println!("  {entry}");
    }
    println!();

    println!("watchers ({}):", watchers.len());
    for handle in watchers.handles() {
        println!(
            "  - {} [{}]: {:?}, fired {}",
            handle.id(),
            handle.label().unwrap_or("-"),
            handle.state(),
            handle.fire_count()
        );
    }

    debug!("report printed");
}

/// Simple dry-run output: print every rule and its effective deadline.
fn print_dry_run(rules: &RulesFile) {
    println!("pagewatch dry-run");
    println!(
        "  config.default_timeout_ms = {}",
        rules.config.default_timeout_ms
    );
    println!(
        "  config.continuous_timeout_ms = {}",
        rules.config.continuous_timeout_ms
    );
    println!();

    println!("rules ({}):", rules.rules.len());
    for (index, rule) in rules.rules.iter().enumerate() {
        println!("  {}. {}", index + 1, rule.kind());
        if rule.registers_watcher() {
            println!(
                "      timeout_ms: {}",
                rule_timeout(rule, &rules.config).as_millis()
            );
        }
        println!("      {rule:?}");
    }

    debug!("dry-run complete (no execution)");
}
