// tests/probing.rs
//
// Probing watchers: the watcher finishes as soon as it matches; the probe
// decides later whether the action runs, and never changes the lifecycle.

use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;

use tokio::time::{Duration, sleep};

use pagewatch::dom::{Document, MemoryDocument, NewElement, Selector};
use pagewatch::probe::{ExistenceProbe, resource_of};
use pagewatch::recipes::{QualityLinks, add_quality_links};
use pagewatch::types::FiringPolicy;
use pagewatch::watcher::{Lifecycle, Payload};
use pagewatch::{RawWatcherConfig, register_watcher};
use pagewatch_test_utils::builders::{PageBuilder, shared};
use pagewatch_test_utils::fakes::{RecordingAction, RecordingSink, StaticProbe};
use pagewatch_test_utils::{init_tracing, settle};

type TestResult = Result<(), Box<dyn Error>>;

const VIDEO_SRC: &str = "https://cdn.example/movie-480p.mp4";

fn video_page() -> MemoryDocument {
    let (page, _) = PageBuilder::new("https://site.example/watch")
        .with(NewElement::new("h1").id("title").text("Movie"))
        .with(NewElement::new("video").attr("src", VIDEO_SRC))
        .build();
    page
}

fn link_hrefs(page: &MemoryDocument) -> BTreeSet<String> {
    page.query_all(&Selector::tag("a"))
        .into_iter()
        .filter_map(|a| a.attr("href").map(str::to_string))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn successful_probe_runs_the_action_after_the_watcher_fired() -> TestResult {
    init_tracing();

    let (page, _) = PageBuilder::new("https://site.example/")
        .with(NewElement::new("a").attr("href", "https://cdn.example/file"))
        .build();
    let probe = StaticProbe::exists().with_delay(Duration::from_millis(300));
    let action = RecordingAction::new();

    let handle = register_watcher(
        shared(&page),
        RawWatcherConfig::new()
            .when_selector("a[href]")
            .policy(FiringPolicy::Probing)
            .probe(probe.clone())
            .then(action.clone()),
    )?;

    assert_eq!(handle.state(), Lifecycle::Fired);
    assert_eq!(page.live_feeds(), 0);
    assert_eq!(probe.probed().len(), 1);
    assert_eq!(
        resource_of(&probe.probed()[0]).as_deref(),
        Some("https://cdn.example/file")
    );
    assert_eq!(action.calls(), 0, "action waits for the probe");

    sleep(Duration::from_millis(301)).await;
    assert_eq!(action.calls(), 1);
    assert_eq!(handle.state(), Lifecycle::Fired);
    assert_eq!(handle.fire_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn probe_outliving_the_deadline_still_runs_the_action() -> TestResult {
    init_tracing();

    let page = MemoryDocument::new("https://site.example/");
    let probe = StaticProbe::exists().with_delay(Duration::from_millis(2_000));
    let action = RecordingAction::new();

    let handle = register_watcher(
        shared(&page),
        RawWatcherConfig::new()
            .when_selector("a[href]")
            .policy(FiringPolicy::Probing)
            .probe(probe.clone())
            .then(action.clone())
            .timeout_ms(1_000),
    )?;

    sleep(Duration::from_millis(100)).await;
    page.append_to_body(NewElement::new("a").attr("href", "https://cdn.example/late"))?;
    settle().await;
    assert_eq!(handle.state(), Lifecycle::Fired);
    assert_eq!(page.live_feeds(), 0);
    assert!(!handle.has_pending_deadline());

    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(action.calls(), 1);
    assert_eq!(handle.state(), Lifecycle::Fired);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_or_failing_probe_skips_the_action_quietly() -> TestResult {
    init_tracing();

    for probe in [StaticProbe::missing(), StaticProbe::failing()] {
        let (page, _) = PageBuilder::new("https://site.example/")
            .with(NewElement::new("a").attr("href", "https://cdn.example/file"))
            .build();
        let action = RecordingAction::new();
        let sink = RecordingSink::new();

        let handle = register_watcher(
            shared(&page),
            RawWatcherConfig::new()
                .when_selector("a[href]")
                .policy(FiringPolicy::Probing)
                .probe(probe.clone())
                .error_sink(sink.sink())
                .then(action.clone()),
        )?;
        sleep(Duration::from_millis(10)).await;

        assert_eq!(probe.probed().len(), 1);
        assert_eq!(action.calls(), 0);
        assert!(sink.reports().is_empty());
        assert_eq!(handle.state(), Lifecycle::Fired);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn quality_links_are_added_for_variants_that_exist() -> TestResult {
    init_tracing();

    let page = video_page();
    let probe = StaticProbe::exists();
    let group = add_quality_links(
        &shared(&page),
        &QualityLinks::new("#title"),
        Arc::new(probe.clone()),
    )?;

    assert_eq!(group.len(), 3);
    assert!(group.all_terminal(), "the video was already there");
    settle().await;

    let probed: BTreeSet<String> = probe
        .probed()
        .iter()
        .filter_map(|p| p.value().map(str::to_string))
        .collect();
    let expected: BTreeSet<String> = [
        "https://cdn.example/movie-1080p.mp4",
        "https://cdn.example/movie-720p.mp4",
        "https://cdn.example/movie-480p.mp4",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    assert_eq!(probed, expected);
    assert_eq!(link_hrefs(&page), expected);

    let links = page.query_all(&Selector::tag("a"));
    for link in &links {
        assert_eq!(link.attr("target"), Some("_blank"));
        assert!(link.attr("style").is_some_and(|s| s.contains("display: inline-block")));
    }
    let labels: BTreeSet<String> = links.iter().map(|l| l.text.clone()).collect();
    assert_eq!(
        labels,
        ["1080p", "480p", "720p"]
            .into_iter()
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn quality_links_wait_for_the_video_and_skip_missing_variants() -> TestResult {
    init_tracing();

    let (page, _) = PageBuilder::new("https://site.example/watch")
        .with(NewElement::new("h1").id("title"))
        .build();

    // Only the 720p variant exists.
    struct Only720;
    impl ExistenceProbe for Only720 {
        fn probe(&self, payload: &Payload) -> pagewatch::probe::ProbeFuture {
            let found = resource_of(payload).is_some_and(|url| url.contains("720p"));
            Box::pin(async move { Ok(found) })
        }
    }

    let group = add_quality_links(
        &shared(&page),
        &QualityLinks::new("#title"),
        Arc::new(Only720),
    )?;
    assert!(!group.all_terminal());

    sleep(Duration::from_millis(500)).await;
    let video = page.append_to_body(NewElement::new("video"))?;
    page.append(
        video,
        NewElement::new("source").attr("src", "https://cdn.example/clip-1080p.webm"),
    )?;
    settle().await;

    assert!(group.all_terminal());
    assert_eq!(
        link_hrefs(&page).into_iter().collect::<Vec<_>>(),
        vec!["https://cdn.example/clip-720p.webm".to_string()]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn quality_links_time_out_without_a_video() -> TestResult {
    init_tracing();

    let (bare, _) = PageBuilder::new("https://site.example/watch")
        .with(NewElement::new("h1").id("title"))
        .build();
    let probe = StaticProbe::exists();
    let group = add_quality_links(
        &shared(&bare),
        &QualityLinks::new("#title"),
        Arc::new(probe.clone()),
    )?;

    sleep(Duration::from_millis(20_001)).await;
    assert!(
        group
            .handles()
            .iter()
            .all(|h| h.state() == Lifecycle::TimedOut)
    );
    assert!(probe.probed().is_empty());
    assert_eq!(bare.live_feeds(), 0);
    Ok(())
}
