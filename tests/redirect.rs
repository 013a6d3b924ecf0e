// tests/redirect.rs
//
// Location-driven watchers: immediate and delayed redirects, history pushes
// and the one-shot location helpers.

use std::error::Error;

use tokio::time::{Duration, sleep};

use pagewatch::actions::{RedirectTo, replace_in_url, with_domain, with_query_fragment};
use pagewatch::dom::{Document, JournalEntry, MemoryDocument, NewElement};
use pagewatch::errors::PagewatchError;
use pagewatch::recipes::{ensure_url_has, redirect_on_url_match, redirect_to_domain};
use pagewatch::watcher::Lifecycle;
use pagewatch::{RawWatcherConfig, register_watcher};
use pagewatch_test_utils::builders::shared;
use pagewatch_test_utils::{init_tracing, settle, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn navigations(page: &MemoryDocument) -> Vec<String> {
    page.journal()
        .into_iter()
        .filter_map(|e| match e {
            JournalEntry::Navigated { to, .. } => Some(to),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn redirects_now_and_after_every_matching_history_push() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/old/a?x=1");
    let handle = redirect_on_url_match(
        &shared(&page),
        "/old/",
        "/new/",
        Duration::ZERO,
        Some(Duration::from_secs(5)),
    )?;

    assert_eq!(page.location(), "https://site.example/new/a?x=1");

    sleep(Duration::from_millis(300)).await;
    page.push_state("https://site.example/old/b");
    settle().await;
    assert_eq!(page.location(), "https://site.example/new/b");

    // Pushes that do not match are left alone.
    page.push_state("https://site.example/other");
    settle().await;
    assert_eq!(page.location(), "https://site.example/other");

    assert_eq!(
        navigations(&page),
        vec![
            "https://site.example/new/a?x=1".to_string(),
            "https://site.example/new/b".to_string(),
        ]
    );
    assert_eq!(handle.state(), Lifecycle::Observing);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.state(), Lifecycle::TimedOut);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn delayed_redirect_happens_once_after_the_delay() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/old/a");
    let _handle = redirect_on_url_match(
        &shared(&page),
        "/old/",
        "/new/",
        Duration::from_millis(300),
        None,
    )?;

    // Page churn during the delay must not schedule more redirects.
    sleep(Duration::from_millis(100)).await;
    page.append_to_body(NewElement::new("div"))?;
    settle().await;

    sleep(Duration::from_millis(199)).await;
    assert_eq!(page.location(), "https://site.example/old/a");

    sleep(Duration::from_millis(2)).await;
    assert_eq!(page.location(), "https://site.example/new/a");

    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(navigations(&page), vec!["https://site.example/new/a".to_string()]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn redirect_needs_pattern_and_replacement() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    for (pattern, replacement) in [("", "/new/"), ("/old/", "")] {
        let err = redirect_on_url_match(&shared(&page), pattern, replacement, Duration::ZERO, None)
            .unwrap_err();
        assert!(matches!(err, PagewatchError::Registration(_)), "got {err:?}");
    }
    assert_eq!(page.live_feeds(), 0);
    Ok(())
}

#[test]
fn ensure_url_has_appends_to_the_query_once() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/watch?v=1#t=10");
    assert!(ensure_url_has(&page, "&hd=1")?);
    assert_eq!(page.location(), "https://site.example/watch?v=1&hd=1#t=10");

    assert!(!ensure_url_has(&page, "hd=1")?);
    assert_eq!(navigations(&page).len(), 1);

    let bare = MemoryDocument::new("https://site.example/watch");
    assert!(ensure_url_has(&bare, "hd=1")?);
    assert_eq!(bare.location(), "https://site.example/watch?hd=1");
    Ok(())
}

#[test]
fn redirect_to_domain_keeps_path_and_query() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://old.example/a/b?q=1");
    assert!(redirect_to_domain(&page, "https://new.example/")?);
    assert_eq!(page.location(), "https://new.example/a/b?q=1");

    assert!(!redirect_to_domain(&page, "https://new.example")?);
    assert_eq!(navigations(&page).len(), 1);
    Ok(())
}

#[test]
fn url_rewrites() {
    assert_eq!(
        replace_in_url("https://s/old/old/", "/old/", "/new/").as_deref(),
        Some("https://s/new/old/")
    );
    assert_eq!(replace_in_url("https://s/new/", "/old/", "/new/"), None);
    assert_eq!(replace_in_url("https://s/a/", "/a/", "/a/"), None);

    assert_eq!(
        with_query_fragment("https://s/p?x=1", "?y=2").as_deref(),
        Some("https://s/p?x=1&y=2")
    );
    assert_eq!(with_query_fragment("https://s/p?y=2", "y=2"), None);
    assert_eq!(with_query_fragment("https://s/p", "&&"), None);

    assert_eq!(
        with_domain("https://a.example/x?y=1", "https://b.example").as_deref(),
        Some("https://b.example/x?y=1")
    );
    assert_eq!(with_domain("https://a.example/x", "https://a.example"), None);
    assert_eq!(with_domain("not a url", "https://b.example"), None);
}

#[tokio::test(start_paused = true)]
async fn redirect_to_skips_when_already_there() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    let target = "https://site.example/next";
    let first = register_watcher(
        shared(&page),
        RawWatcherConfig::new()
            .when_selector("#go")
            .then(RedirectTo::new(target)),
    )?;
    let second = register_watcher(
        shared(&page),
        RawWatcherConfig::new()
            .when_selector("#go")
            .then(RedirectTo::new(target)),
    )?;

    with_timeout(sleep(Duration::from_millis(50))).await;
    page.append_to_body(NewElement::new("a").id("go"))?;
    settle().await;

    assert_eq!(first.state(), Lifecycle::Fired);
    assert_eq!(second.state(), Lifecycle::Fired);
    assert_eq!(page.location(), target);
    assert_eq!(navigations(&page), vec![target.to_string()]);
    Ok(())
}
