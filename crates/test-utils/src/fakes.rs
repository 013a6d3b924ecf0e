use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use pagewatch::actions::Action;
use pagewatch::dom::SharedDocument;
use pagewatch::errors::PagewatchError;
use pagewatch::probe::{ExistenceProbe, ProbeFuture};
use pagewatch::watcher::{ErrorSink, Payload, WatcherId};

/// An action that records every payload it is run with.
///
/// Clones share the same record, so keep one clone and hand the other to the
/// watcher.
#[derive(Clone, Default)]
pub struct RecordingAction {
    payloads: Arc<Mutex<Vec<Payload>>>,
    fail_with: Option<String>,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the call, then returns an error with `msg`.
    pub fn failing(msg: &str) -> Self {
        Self {
            payloads: Arc::default(),
            fail_with: Some(msg.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<Payload> {
        self.payloads.lock().unwrap().clone()
    }

    /// Values of value payloads, in call order.
    pub fn values(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .filter_map(|p| p.value().map(str::to_string))
            .collect()
    }
}

impl Action for RecordingAction {
    fn run(&self, payload: &Payload, _doc: &SharedDocument) -> anyhow::Result<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        match &self.fail_with {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

/// Collects reported errors as `(watcher, message)` pairs.
#[derive(Clone, Default)]
pub struct RecordingSink {
    reports: Arc<Mutex<Vec<(WatcherId, String)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> ErrorSink {
        let reports = self.reports.clone();
        Arc::new(move |id: WatcherId, err: &PagewatchError| {
            reports.lock().unwrap().push((id, err.to_string()));
        })
    }

    pub fn reports(&self) -> Vec<(WatcherId, String)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.reports().into_iter().map(|(_, m)| m).collect()
    }
}

#[derive(Clone, Copy, Debug)]
enum Answer {
    Exists,
    Missing,
    Fails,
}

/// A probe with a fixed answer and optional latency.
#[derive(Clone)]
pub struct StaticProbe {
    answer: Answer,
    delay: Duration,
    probed: Arc<Mutex<Vec<Payload>>>,
}

impl StaticProbe {
    fn with_answer(answer: Answer) -> Self {
        Self {
            answer,
            delay: Duration::ZERO,
            probed: Arc::default(),
        }
    }

    pub fn exists() -> Self {
        Self::with_answer(Answer::Exists)
    }

    pub fn missing() -> Self {
        Self::with_answer(Answer::Missing)
    }

    pub fn failing() -> Self {
        Self::with_answer(Answer::Fails)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn probed(&self) -> Vec<Payload> {
        self.probed.lock().unwrap().clone()
    }
}

impl ExistenceProbe for StaticProbe {
    fn probe(&self, payload: &Payload) -> ProbeFuture {
        self.probed.lock().unwrap().push(payload.clone());
        let answer = self.answer;
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match answer {
                Answer::Exists => Ok(true),
                Answer::Missing => Ok(false),
                Answer::Fails => Err(anyhow!("connection refused")),
            }
        })
    }
}
