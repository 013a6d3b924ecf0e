// tests/config_loading.rs
//
// Rules files: TOML parsing, defaults and validation errors.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use pagewatch::apply::{register_rules, rule_timeout};
use pagewatch::cli::CliArgs;
use pagewatch::config::{ConfigSection, RuleConfig, load_and_validate, load_from_path};
use pagewatch::dom::MemoryDocument;
use pagewatch::errors::PagewatchError;
use pagewatch::watcher::Lifecycle;
use pagewatch_test_utils::builders::{RulesFileBuilder, shared};
use pagewatch_test_utils::fakes::StaticProbe;
use pagewatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

fn load_str(contents: &str) -> Result<pagewatch::config::RulesFile, PagewatchError> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("Pagewatch.toml");
    fs::write(&path, contents).expect("write rules");
    load_and_validate(&path)
}

fn config_error(contents: &str) -> String {
    match load_str(contents) {
        Err(PagewatchError::ConfigError(msg)) => msg,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn demo_rules_load_in_file_order() -> TestResult {
    init_tracing();

    let rules = load_and_validate(demo("Pagewatch.toml"))?;
    assert_eq!(rules.config.default_timeout_ms, 5_000);
    assert_eq!(rules.config.continuous_timeout_ms, 8_000);

    let kinds: Vec<&str> = rules.rules.iter().map(RuleConfig::kind).collect();
    assert_eq!(
        kinds,
        vec!["click", "click_text", "remove", "redirect", "quality", "storage", "cookie"]
    );

    match &rules.rules[4] {
        RuleConfig::Quality {
            selector,
            attribute,
            lower,
            upper,
            follow_up,
            ..
        } => {
            assert_eq!(selector, "[data-value]");
            assert_eq!(attribute, "data-value");
            assert_eq!((*lower, *upper), (10, 1080));
            assert_eq!(follow_up.as_deref(), Some("video"));
        }
        other => panic!("expected a quality rule, got {other:?}"),
    }
    match &rules.rules[6] {
        RuleConfig::Cookie { name, value, days } => {
            assert_eq!(name, "consent");
            assert_eq!(value.as_deref(), Some("yes"));
            assert_eq!(*days, 30);
        }
        other => panic!("expected a cookie rule, got {other:?}"),
    }
    Ok(())
}

#[test]
fn rule_timeouts_follow_kind_and_config() -> TestResult {
    init_tracing();

    let cfg = ConfigSection {
        default_timeout_ms: 5_000,
        continuous_timeout_ms: 8_000,
    };
    let raw = load_from_path(demo("Pagewatch.toml"))?;

    let click = &raw.rule[0];
    let remove = &raw.rule[2];
    assert_eq!(rule_timeout(click, &cfg), Duration::from_millis(5_000));
    assert_eq!(rule_timeout(remove, &cfg), Duration::from_millis(8_000));

    let login = RuleConfig::Login {
        user_selector: "#u".into(),
        pass_selector: "#p".into(),
        button_selector: "#go".into(),
        user: "alice".into(),
        pass: "secret".into(),
        timeout_ms: None,
    };
    assert_eq!(rule_timeout(&login, &cfg), Duration::from_secs(10));

    let links = RuleConfig::QualityLinks {
        below: "#title".into(),
        timeout_ms: None,
    };
    assert_eq!(rule_timeout(&links, &cfg), Duration::from_secs(20));

    let explicit = RuleConfig::Remove {
        selector: ".ad".into(),
        timeout_ms: Some(250),
    };
    assert_eq!(rule_timeout(&explicit, &cfg), Duration::from_millis(250));
    Ok(())
}

#[test]
fn defaults_apply_when_config_section_is_missing() -> TestResult {
    init_tracing();

    let rules = load_str(
        r#"
[[rule]]
kind = "redirect"
match = "/old/"
replace = "/new/"
"#,
    )?;
    assert_eq!(rules.config.default_timeout_ms, 30_000);
    assert_eq!(rules.config.continuous_timeout_ms, 60_000);
    match &rules.rules[0] {
        RuleConfig::Redirect {
            pattern,
            replace,
            delay_ms,
            timeout_ms,
        } => {
            assert_eq!((pattern.as_str(), replace.as_str()), ("/old/", "/new/"));
            assert_eq!(*delay_ms, 0);
            assert_eq!(*timeout_ms, None);
        }
        other => panic!("expected a redirect rule, got {other:?}"),
    }
    Ok(())
}

#[test]
fn a_rules_file_needs_at_least_one_rule() {
    init_tracing();

    let msg = config_error("[config]\ndefault_timeout_ms = 100\n");
    assert!(msg.contains("at least one [[rule]]"), "got {msg}");
}

#[test]
fn zero_timeouts_are_rejected() {
    init_tracing();

    let msg = config_error("[config]\ndefault_timeout_ms = 0\n\n[[rule]]\nkind = \"click\"\nselector = \"#x\"\n");
    assert!(msg.contains("default_timeout_ms"), "got {msg}");

    let msg = config_error("[[rule]]\nkind = \"click\"\nselector = \"#x\"\ntimeout_ms = 0\n");
    assert!(msg.starts_with("rule #1 (click)"), "got {msg}");
}

#[test]
fn empty_fields_and_bad_bounds_are_rejected() {
    init_tracing();

    let msg = config_error(
        "[[rule]]\nkind = \"click\"\nselector = \"#x\"\n\n[[rule]]\nkind = \"redirect\"\nmatch = \"\"\nreplace = \"/new/\"\n",
    );
    assert!(msg.starts_with("rule #2 (redirect)"), "got {msg}");
    assert!(msg.contains("`match`"), "got {msg}");

    let msg = config_error("[[rule]]\nkind = \"quality\"\nlower = 720\nupper = 480\n");
    assert!(msg.contains("`lower` must be less than `upper`"), "got {msg}");

    let msg = config_error("[[rule]]\nkind = \"click_text\"\ntext = \"  \"\n");
    assert!(msg.contains("`text`"), "got {msg}");

    let msg = config_error("[[rule]]\nkind = \"cookie\"\nname = \"\"\n");
    assert!(msg.contains("`name`"), "got {msg}");
}

#[test]
fn bad_selectors_are_rejected() {
    init_tracing();

    let err = load_str("[[rule]]\nkind = \"remove\"\nselector = \".ad:hover\"\n").unwrap_err();
    assert!(
        matches!(err, PagewatchError::InvalidSelector { ref selector, .. } if selector == ".ad:hover"),
        "got {err:?}"
    );
}

#[test]
fn unknown_rule_kinds_fail_to_parse() {
    init_tracing();

    let err = load_str("[[rule]]\nkind = \"teleport\"\nselector = \"#x\"\n").unwrap_err();
    assert!(matches!(err, PagewatchError::TomlError(_)), "got {err:?}");
}

#[test]
fn missing_file_is_an_io_error() {
    init_tracing();

    let dir = tempdir().expect("tempdir");
    let err = load_and_validate(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, PagewatchError::IoError(_)), "got {err:?}");
}

#[test]
fn builder_produces_valid_rules() {
    init_tracing();

    let rules = RulesFileBuilder::new()
        .with_default_timeout_ms(1_000)
        .with_rule(RuleConfig::EnsureQuery {
            fragment: "hd=1".into(),
        })
        .build();
    assert_eq!(rules.rules.len(), 1);
    assert!(!rules.rules[0].registers_watcher());
    assert_eq!(rules.config.default_timeout_ms, 1_000);
}

#[tokio::test(start_paused = true)]
async fn extreme_numbers_in_rules_do_not_break_registration() -> TestResult {
    init_tracing();

    let rules = load_str(
        r##"
[[rule]]
kind = "click"
selector = "#x"
timeout_ms = 9223372036854775807

[[rule]]
kind = "cookie"
name = "consent"
value = "yes"
days = 1000000000000000
"##,
    )?;

    let page = MemoryDocument::new("https://site.example/");
    let watchers = register_rules(&shared(&page), &rules, Arc::new(StaticProbe::missing()))?;

    assert_eq!(watchers.len(), 1);
    assert_eq!(watchers.handles()[0].state(), Lifecycle::Observing);
    assert_eq!(
        page.raw_cookies(),
        vec![format!("consent=yes; max-age={}; path=/", u64::MAX)]
    );
    watchers.cancel_all();
    Ok(())
}

#[tokio::test]
async fn run_names_the_file_that_failed_to_load() {
    init_tracing();

    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("nope.toml").display().to_string();

    let err = pagewatch::run(CliArgs {
        config: missing.clone(),
        page: None,
        until_ms: None,
        log_level: None,
        dry_run: true,
    })
    .await
    .unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("loading rules file at"), "got {msg}");
    assert!(msg.contains(&missing), "got {msg}");

    let err = pagewatch::run(CliArgs {
        config: demo("Pagewatch.toml").display().to_string(),
        page: Some(missing.clone()),
        until_ms: None,
        log_level: None,
        dry_run: false,
    })
    .await
    .unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("loading page fixture at"), "got {msg}");
    assert!(msg.contains(&missing), "got {msg}");
}
