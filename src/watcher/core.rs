// src/watcher/core.rs

//! Pure watcher state machine.
//!
//! [`WatcherCore`] consumes [`WatchEvent`]s and returns the
//! [`WatchCommand`]s the shell must execute, in order. It tracks whether it
//! currently holds a change feed and an armed deadline so that every
//! `Subscribe` is matched by exactly one `Unsubscribe` and every
//! `ArmDeadline` by exactly one `ClearDeadline`, whichever way the watcher
//! terminates and however many cancels arrive afterwards.
//!
//! No tokio, no document, no callbacks: this is unit-testable in isolation.

use tracing::debug;

use crate::types::FiringPolicy;
use crate::watcher::policy::{Dedup, decide};
use crate::watcher::{Lifecycle, MatchResult, WatchCommand, WatchEvent};

#[derive(Debug, Clone)]
pub struct WatcherCore {
    policy: FiringPolicy,
    state: Lifecycle,
    feed_live: bool,
    deadline_armed: bool,
    dedup: Dedup,
    fired: u64,
}

impl WatcherCore {
    pub fn new(policy: FiringPolicy) -> Self {
        Self {
            policy,
            state: Lifecycle::Created,
            feed_live: false,
            deadline_armed: false,
            dedup: Dedup::new(),
            fired: 0,
        }
    }

    pub fn policy(&self) -> FiringPolicy {
        self.policy
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether a change feed subscription is outstanding.
    pub fn feed_live(&self) -> bool {
        self.feed_live
    }

    /// Whether a deadline timer is outstanding.
    pub fn deadline_armed(&self) -> bool {
        self.deadline_armed
    }

    /// Number of `Fire`/`Probe` commands issued so far.
    pub fn fire_count(&self) -> u64 {
        self.fired
    }

    /// Handle one event, returning the commands to execute.
    pub fn step(&mut self, event: WatchEvent) -> Vec<WatchCommand> {
        let before = self.state;
        let commands = match event {
            WatchEvent::Started { outcome } => self.on_started(outcome),
            WatchEvent::Changed { outcome } => self.on_changed(outcome),
            WatchEvent::DeadlineElapsed => {
                if self.state == Lifecycle::Observing {
                    self.terminate(Lifecycle::TimedOut)
                } else {
                    Vec::new()
                }
            }
            WatchEvent::CancelRequested => self.terminate_if_live(Lifecycle::Cancelled),
            WatchEvent::Faulted => self.terminate_if_live(Lifecycle::Faulted),
        };

        if before != self.state {
            debug!(from = ?before, to = ?self.state, "watcher transition");
        }
        self.fired += commands
            .iter()
            .filter(|c| matches!(c, WatchCommand::Fire(_) | WatchCommand::Probe(_)))
            .count() as u64;
        commands
    }

    fn on_started(&mut self, outcome: MatchResult) -> Vec<WatchCommand> {
        if self.state != Lifecycle::Created {
            return Vec::new();
        }

        // A single-shot watcher whose target already exists never observes.
        if let Some(payload) = &outcome {
            if self.policy != FiringPolicy::Continuous {
                let decision = decide(self.policy, &mut self.dedup, payload.clone());
                self.state = Lifecycle::Fired;
                return decision.command.into_iter().collect();
            }
        }

        self.state = Lifecycle::Observing;
        self.feed_live = true;
        self.deadline_armed = true;
        let mut commands = vec![WatchCommand::ArmDeadline, WatchCommand::Subscribe];

        if let Some(payload) = outcome {
            let decision = decide(self.policy, &mut self.dedup, payload);
            commands.extend(decision.command);
        }
        commands
    }

    fn on_changed(&mut self, outcome: MatchResult) -> Vec<WatchCommand> {
        if self.state != Lifecycle::Observing {
            return Vec::new();
        }

        let Some(payload) = outcome else {
            self.dedup.reset();
            return Vec::new();
        };

        let decision = decide(self.policy, &mut self.dedup, payload);
        if decision.terminal {
            // Release first: the action may mutate the page and must not
            // re-trigger this watcher.
            let mut commands = self.terminate(Lifecycle::Fired);
            commands.extend(decision.command);
            commands
        } else {
            decision.command.into_iter().collect()
        }
    }

    fn terminate_if_live(&mut self, next: Lifecycle) -> Vec<WatchCommand> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.terminate(next)
    }

    fn terminate(&mut self, next: Lifecycle) -> Vec<WatchCommand> {
        self.state = next;
        let mut commands = Vec::new();
        if std::mem::take(&mut self.feed_live) {
            commands.push(WatchCommand::Unsubscribe);
        }
        if std::mem::take(&mut self.deadline_armed) {
            commands.push(WatchCommand::ClearDeadline);
        }
        commands
    }
}
