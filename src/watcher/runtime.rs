// src/watcher/runtime.rs

//! Async shell around [`WatcherCore`].
//!
//! This owns the real resources (change feed registration, deadline timer),
//! evaluates the condition, and runs actions and probes. All lifecycle
//! decisions are delegated to the core; the shell only executes the commands
//! it gets back.
//!
//! Locking: the driver mutex is held while stepping the core and applying
//! resource commands, never while a condition, action or probe runs. An
//! action is therefore free to mutate the page or cancel its own watcher.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::actions::Action;
use crate::dom::{NodeId, SharedDocument};
use crate::errors::{PagewatchError, Result};
use crate::feed::{FeedReceiver, FeedRegistration};
use crate::probe::ExistenceProbe;
use crate::watcher::condition::Condition;
use crate::watcher::config::{RawWatcherConfig, WatcherConfig};
use crate::watcher::core::WatcherCore;
use crate::watcher::{Lifecycle, MatchResult, Payload, WatchCommand, WatchEvent, WatcherId};

/// Receives errors raised by conditions and actions.
pub type ErrorSink = Arc<dyn Fn(WatcherId, &PagewatchError) + Send + Sync>;

/// Sink used when a registration does not supply one.
pub fn default_error_sink() -> ErrorSink {
    Arc::new(|id: WatcherId, err: &PagewatchError| {
        warn!(watcher = %id, error = %err, "watcher callback failed")
    })
}

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Deadline used when the configured timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Register a watcher on `doc`.
///
/// The configuration is validated and the condition evaluated once before
/// this returns. If that eager check already satisfies a single-fire or
/// probing watcher, the action (or probe) is started immediately and no
/// change feed is ever created.
///
/// Must be called from within a tokio runtime.
pub fn register_watcher(doc: SharedDocument, raw: RawWatcherConfig) -> Result<WatcherHandle> {
    let config = WatcherConfig::try_from(raw)?;
    let id = WatcherId(NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed));
    let root = config.root.unwrap_or_else(|| doc.body());

    info!(
        watcher = %id,
        label = config.label.as_deref().unwrap_or("-"),
        policy = ?config.policy,
        timeout_ms = config.timeout.as_millis() as u64,
        "registering watcher"
    );

    let shared = Arc::new(Shared {
        id,
        label: config.label,
        deadline: deadline_after(config.timeout),
        root,
        doc,
        condition: config.condition,
        action: config.action,
        probe: config.probe,
        sink: config.error_sink.unwrap_or_else(default_error_sink),
        driver: Mutex::new(Driver {
            core: WatcherCore::new(config.policy),
            feed: None,
            timer: None,
        }),
    });

    match shared.evaluate() {
        Ok(outcome) => {
            if let Some(receiver) = shared.dispatch(WatchEvent::Started { outcome }) {
                tokio::spawn(watch(shared.clone(), receiver));
            }
        }
        Err(err) => shared.fault(err),
    }

    Ok(WatcherHandle { shared })
}

/// Handle to a registered watcher.
///
/// Dropping the handle detaches it: the watcher keeps running until it reaches
/// a terminal state on its own. Only [`WatcherHandle::cancel`] stops it early.
pub struct WatcherHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl WatcherHandle {
    /// Cancel the watcher.
    ///
    /// The feed is unsubscribed and the deadline cleared before this returns.
    /// An action already running is not interrupted. Calling this on a
    /// terminated watcher, or more than once, does nothing.
    pub fn cancel(&self) {
        self.shared.dispatch(WatchEvent::CancelRequested);
    }

    pub fn id(&self) -> WatcherId {
        self.shared.id
    }

    pub fn label(&self) -> Option<&str> {
        self.shared.label.as_deref()
    }

    pub fn state(&self) -> Lifecycle {
        self.shared.lock().core.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Whether this watcher still holds a change-feed subscription.
    pub fn has_live_feed(&self) -> bool {
        self.shared
            .lock()
            .feed
            .as_ref()
            .is_some_and(FeedRegistration::is_active)
    }

    /// Whether this watcher still holds a deadline timer.
    pub fn has_pending_deadline(&self) -> bool {
        self.shared.lock().timer.is_some()
    }

    /// Number of times the action (or probe) has been started.
    pub fn fire_count(&self) -> u64 {
        self.shared.lock().core.fire_count()
    }
}

/// Several watchers that are cancelled together.
#[derive(Debug, Default)]
pub struct WatcherGroup {
    handles: Vec<WatcherHandle>,
}

impl WatcherGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: WatcherHandle) {
        self.handles.push(handle);
    }

    pub fn handles(&self) -> &[WatcherHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn cancel_all(&self) {
        for handle in &self.handles {
            handle.cancel();
        }
    }

    /// Whether every watcher in the group has terminated.
    pub fn all_terminal(&self) -> bool {
        self.handles.iter().all(WatcherHandle::is_terminal)
    }
}

impl Extend<WatcherHandle> for WatcherGroup {
    fn extend<I: IntoIterator<Item = WatcherHandle>>(&mut self, iter: I) {
        self.handles.extend(iter);
    }
}

impl IntoIterator for WatcherGroup {
    type Item = WatcherHandle;
    type IntoIter = std::vec::IntoIter<WatcherHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.into_iter()
    }
}

impl FromIterator<WatcherHandle> for WatcherGroup {
    fn from_iter<I: IntoIterator<Item = WatcherHandle>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
        }
    }
}

struct Shared {
    id: WatcherId,
    label: Option<String>,
    deadline: Instant,
    root: NodeId,
    doc: SharedDocument,
    condition: Arc<dyn Condition>,
    action: Arc<dyn Action>,
    probe: Option<Arc<dyn ExistenceProbe>>,
    sink: ErrorSink,
    driver: Mutex<Driver>,
}

struct Driver {
    core: WatcherCore,
    feed: Option<FeedRegistration>,
    timer: Option<DeadlineTimer>,
}

/// Spawned sleep that reports `DeadlineElapsed`; aborted when dropped.
struct DeadlineTimer(JoinHandle<()>);

impl DeadlineTimer {
    fn arm(shared: Weak<Shared>, deadline: Instant) -> Self {
        DeadlineTimer(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(shared) = shared.upgrade() {
                shared.dispatch(WatchEvent::DeadlineElapsed);
            }
        }))
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Driver> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_terminal(&self) -> bool {
        self.lock().core.is_terminal()
    }

    /// Step the core and apply its commands.
    ///
    /// Resource commands are applied under the lock; actions and probes run
    /// after it is released. Returns the feed receiver when the step
    /// subscribed.
    fn dispatch(self: &Arc<Self>, event: WatchEvent) -> Option<FeedReceiver> {
        let mut receiver = None;
        let mut deferred = Vec::new();

        {
            let mut driver = self.lock();
            let before = driver.core.state();
            for command in driver.core.step(event) {
                match command {
                    WatchCommand::Subscribe => {
                        let (registration, rx) = self.doc.subscribe(self.root).into_parts();
                        debug!(watcher = %self.id, feed = %registration.id(), "subscribed");
                        driver.feed = Some(registration);
                        receiver = Some(rx);
                    }
                    WatchCommand::ArmDeadline => {
                        driver.timer = Some(DeadlineTimer::arm(Arc::downgrade(self), self.deadline));
                    }
                    WatchCommand::Unsubscribe => {
                        if let Some(feed) = driver.feed.take() {
                            feed.unsubscribe();
                        }
                    }
                    WatchCommand::ClearDeadline => {
                        driver.timer = None;
                    }
                    WatchCommand::Fire(_) | WatchCommand::Probe(_) => deferred.push(command),
                }
            }

            let state = driver.core.state();
            if state != before && state.is_terminal() {
                info!(watcher = %self.id, ?state, "watcher finished");
            }
        }

        for command in deferred {
            match command {
                WatchCommand::Fire(payload) => self.fire(&payload),
                WatchCommand::Probe(payload) => self.start_probe(payload),
                _ => {}
            }
        }
        receiver
    }

    fn evaluate(&self) -> Result<MatchResult> {
        match catch_unwind(AssertUnwindSafe(|| self.condition.evaluate(self.doc.as_ref()))) {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => Err(PagewatchError::Condition(format!("{err:#}"))),
            Err(panic) => Err(PagewatchError::Condition(panic_message(panic))),
        }
    }

    fn run_action(&self, payload: &Payload) -> Result<()> {
        run_action(self.action.as_ref(), payload, &self.doc)
    }

    fn fire(self: &Arc<Self>, payload: &Payload) {
        debug!(watcher = %self.id, "firing action");
        if let Err(err) = self.run_action(payload) {
            self.fault(err);
        }
    }

    /// Report `err` and terminate. Already-terminal watchers keep their state.
    fn fault(self: &Arc<Self>, err: PagewatchError) {
        (self.sink)(self.id, &err);
        self.dispatch(WatchEvent::Faulted);
    }

    fn start_probe(self: &Arc<Self>, payload: Payload) {
        let Some(probe) = self.probe.as_ref() else {
            return;
        };
        let pending = probe.probe(&payload);
        let shared = self.clone();

        tokio::spawn(async move {
            match pending.await {
                Ok(true) => {
                    debug!(watcher = %shared.id, "probe succeeded");
                    if let Err(err) = shared.run_action(&payload) {
                        (shared.sink)(shared.id, &err);
                    }
                }
                Ok(false) => debug!(watcher = %shared.id, "probe found nothing"),
                Err(err) => debug!(watcher = %shared.id, error = %err, "probe failed"),
            }
        });
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

fn run_action(action: &dyn Action, payload: &Payload, doc: &SharedDocument) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| action.run(payload, doc))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(PagewatchError::Action(format!("{err:#}"))),
        Err(panic) => Err(PagewatchError::Action(panic_message(panic))),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Per-watcher loop: re-evaluate the condition on every change batch until
/// the feed is released.
async fn watch(shared: Arc<Shared>, mut feed: FeedReceiver) {
    while let Some(batch) = feed.next_batch().await {
        if shared.is_terminal() {
            break;
        }
        debug!(watcher = %shared.id, records = batch.len(), "change batch");

        if Instant::now() >= shared.deadline {
            shared.dispatch(WatchEvent::DeadlineElapsed);
            break;
        }

        match shared.evaluate() {
            Ok(outcome) => {
                shared.dispatch(WatchEvent::Changed { outcome });
            }
            Err(err) => shared.fault(err),
        }
    }

    if !shared.is_terminal() {
        // The document dropped the feed underneath us.
        debug!(watcher = %shared.id, "change feed closed; cancelling");
        shared.dispatch(WatchEvent::CancelRequested);
    }
}
