//! Per-command cooldown tracking, driven by the session tick.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use cmdbridge_common::models::CommandMode;

use crate::tasks::DeadlineQueue;

#[derive(Default)]
pub struct CooldownTracker {
    mode: CommandMode,
    active: HashSet<String>,
    expiries: DeadlineQueue<String>,
}

impl CooldownTracker {
    pub fn new(mode: CommandMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn mode(&self) -> CommandMode {
        self.mode
    }

    /// Switching to `Disabled` forgets every running cooldown.
    pub fn set_mode(&mut self, mode: CommandMode) {
        self.mode = mode;
        if mode == CommandMode::Disabled {
            self.clear();
        }
    }

    /// Starts a cooldown for `name` unless one is already running.
    /// Returns false when the command is on cooldown; true otherwise,
    /// including when the mode is `Disabled`.
    pub fn try_start(&mut self, name: &str, duration: Duration, now: Instant) -> bool {
        if self.mode == CommandMode::Disabled {
            return true;
        }
        if self.active.contains(name) {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        self.active.insert(name.to_string());
        match now.checked_add(duration) {
            Some(deadline) => self.expiries.schedule(deadline, name.to_string()),
            // past the clock's range: held until cleared
            None => trace!("cooldown for '{}' never expires", name),
        }
        true
    }

    pub fn is_on_cooldown(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    /// Releases every cooldown whose deadline is at or before `now`.
    pub fn release_expired(&mut self, now: Instant) -> Vec<String> {
        let released = self.expiries.pop_expired(now);
        for name in &released {
            trace!("cooldown over for '{}'", name);
            self.active.remove(name);
        }
        released
    }

    /// Ends `name`'s cooldown early. False if none was running.
    pub fn cancel(&mut self, name: &str) -> bool {
        if !self.active.remove(name) {
            return false;
        }
        self.expiries.retain(|n| n != name);
        true
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.expiries.next_deadline()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.expiries.clear();
    }

    pub fn on_cooldown(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.iter().cloned().collect();
        names.sort();
        names
    }
}
