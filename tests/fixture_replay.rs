// tests/fixture_replay.rs
//
// Page fixtures: loading, building the initial page, replaying the timeline,
// and the bundled demo end to end.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use tokio::time::{Duration, sleep};

use pagewatch::apply::register_rules;
use pagewatch::config::load_and_validate;
use pagewatch::dom::{Document, JournalEntry, PageStorage, Selector, SharedDocument};
use pagewatch::errors::PagewatchError;
use pagewatch::fixture::{EventAction, build_document, load_fixture, replay_timeline};
use pagewatch::storage::cookie_value;
use pagewatch::watcher::Lifecycle;
use pagewatch_test_utils::fakes::StaticProbe;
use pagewatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
}

#[test]
fn demo_page_builds_with_its_initial_nodes() -> TestResult {
    init_tracing();

    let fixture = load_fixture(demo("page.toml"))?;
    assert_eq!(fixture.url, "https://video.example/old/watch?v=42");
    assert_eq!(fixture.last_event_ms(), 1_200);
    assert!(matches!(fixture.events[3].action, EventAction::Navigate(_)));

    let page = build_document(&fixture)?;
    assert_eq!(page.query_all(&Selector::parse("#qualities > li")?).len(), 4);
    assert_eq!(page.query_all(&Selector::parse("#player video[src]")?).len(), 1);
    assert!(page.journal().is_empty(), "building the page is not journaled");
    Ok(())
}

#[test]
fn events_are_sorted_and_must_have_exactly_one_action() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("page.toml");

    fs::write(
        &path,
        r#"
url = "https://site.example/"

[[event]]
at_ms = 300
remove = ".x"

[[event]]
at_ms = 100
navigate = "https://site.example/next"
"#,
    )?;
    let fixture = load_fixture(&path)?;
    let times: Vec<u64> = fixture.events.iter().map(|e| e.at_ms).collect();
    assert_eq!(times, vec![100, 300]);

    fs::write(
        &path,
        r#"
url = "https://site.example/"

[[event]]
at_ms = 100
remove = ".x"
navigate = "https://site.example/next"
"#,
    )?;
    let err = load_fixture(&path).unwrap_err();
    assert!(
        matches!(err, PagewatchError::ConfigError(ref m) if m.contains("exactly one")),
        "got {err:?}"
    );

    fs::write(&path, "url = \"\"\n")?;
    assert!(matches!(load_fixture(&path), Err(PagewatchError::ConfigError(_))));
    Ok(())
}

#[test]
fn unknown_parent_is_an_error() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("page.toml");
    fs::write(
        &path,
        r##"
url = "https://site.example/"

[[node]]
tag = "li"
parent = "#missing"
"##,
    )?;
    let fixture = load_fixture(&path)?;
    assert!(matches!(build_document(&fixture), Err(PagewatchError::ConfigError(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timeline_applies_events_at_their_times() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("page.toml");
    fs::write(
        &path,
        r##"
url = "https://site.example/"

[[node]]
tag = "div"
id = "box"
attrs = { "data-state" = "idle" }

[[event]]
at_ms = 100
set_attr = { selector = "#box", name = "data-state", value = "busy" }

[[event]]
at_ms = 200
insert = { tag = "span", parent = "#box", text = "hi" }

[[event]]
at_ms = 300
remove = "#box"

[[event]]
at_ms = 350
remove = "#box"
"##,
    )?;
    let fixture = load_fixture(&path)?;
    let page = build_document(&fixture)?;
    let boxed = Selector::parse("#box")?;
    tokio::spawn(replay_timeline(page.clone(), fixture));

    sleep(Duration::from_millis(150)).await;
    let el = page.query(&boxed).ok_or("box missing")?;
    assert_eq!(el.attr("data-state"), Some("busy"));

    sleep(Duration::from_millis(100)).await;
    assert_eq!(page.query(&boxed).map(|e| e.text), Some("hi".to_string()));

    // The second removal finds nothing and is skipped.
    sleep(Duration::from_millis(200)).await;
    assert!(page.query(&boxed).is_none());
    assert!(page.journal().is_empty(), "page-side changes are not journaled");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn demo_rules_against_demo_page() -> TestResult {
    init_tracing();

    let rules = load_and_validate(demo("Pagewatch.toml"))?;
    let fixture = load_fixture(demo("page.toml"))?;
    let page = build_document(&fixture)?;
    let doc: SharedDocument = Arc::new(page.clone());

    let watchers = register_rules(&doc, &rules, Arc::new(StaticProbe::missing()))?;
    assert_eq!(watchers.len(), 5, "storage and cookie rules register nothing");

    tokio::spawn(replay_timeline(page.clone(), fixture));
    sleep(Duration::from_millis(2_200)).await;

    let journal = page.journal();
    let lines: Vec<String> = journal.iter().map(ToString::to_string).collect();
    let has = |needle: &str| lines.iter().any(|l| l.contains(needle));

    assert!(has("navigate https://video.example/old/watch?v=42 -> https://video.example/new/watch?v=42"), "{lines:#?}");
    assert!(has("navigate https://video.example/old/next -> https://video.example/new/next"), "{lines:#?}");
    assert!(has("click    button#accept-cookies"), "{lines:#?}");
    assert!(has("click    video"), "{lines:#?}");

    let removed = journal
        .iter()
        .filter(|e| matches!(e, JournalEntry::Removed { element, .. } if element == "div.ad-banner"))
        .count();
    assert_eq!(removed, 2, "{lines:#?}");

    let clicked: Vec<String> = journal
        .iter()
        .filter_map(|e| match e {
            JournalEntry::Clicked { node, .. } => page.element(*node).map(|el| el.text.trim().to_string()),
            _ => None,
        })
        .collect();
    assert!(clicked.contains(&"1080p".to_string()), "{clicked:?}");
    assert!(clicked.contains(&"I'm 18 or OLDER".to_string()), "{clicked:?}");

    let settings: serde_json::Value =
        serde_json::from_str(&page.get_item("x-player-settings")?.ok_or("no settings")?)?;
    assert_eq!(settings, json!({"volume": 0.5}));
    assert_eq!(cookie_value(&page, "consent").as_deref(), Some("yes"));

    let states: Vec<Lifecycle> = watchers.handles().iter().map(|h| h.state()).collect();
    assert_eq!(
        states,
        vec![
            Lifecycle::Fired,     // click
            Lifecycle::Fired,     // click_text
            Lifecycle::Observing, // remove
            Lifecycle::Observing, // redirect
            Lifecycle::Fired,     // quality
        ]
    );

    watchers.cancel_all();
    assert_eq!(page.live_feeds(), 0);
    Ok(())
}
