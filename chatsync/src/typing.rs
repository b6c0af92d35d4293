//! Typing indicators in both directions.
//!
//! [`TypingAggregator`] tracks which remote participants are typing, driven
//! purely by explicit start/stop events from the server. [`TypingSignaler`]
//! decides when the local participant's own start/stop signals go out,
//! debouncing keystrokes behind a single re-armable deadline.

use std::time::Duration;

use tokio::time::Instant;

use chatsync_proto::message::Identity;

/// Remote participants currently typing, in the order they started.
///
/// There is no receive-side timeout: an identity stays here until a
/// matching stop arrives.
#[derive(Debug, Clone, Default)]
pub struct TypingAggregator {
    typing: Vec<Identity>,
}

impl TypingAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub const fn new() -> Self {
        Self { typing: Vec::new() }
    }

    /// Mark `user` as typing. Returns `false` if they already were.
    pub fn add(&mut self, user: Identity) -> bool {
        if self.typing.contains(&user) {
            return false;
        }
        self.typing.push(user);
        true
    }

    /// Mark `user` as no longer typing. Returns `false` if they were not.
    pub fn remove(&mut self, user: &Identity) -> bool {
        let before = self.typing.len();
        self.typing.retain(|u| u != user);
        self.typing.len() != before
    }

    /// Whether `user` is currently typing.
    #[must_use]
    pub fn contains(&self, user: &Identity) -> bool {
        self.typing.contains(user)
    }

    /// Typing identities in insertion order.
    #[must_use]
    pub fn users(&self) -> &[Identity] {
        &self.typing
    }

    /// Number of typing identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.typing.len()
    }

    /// Whether nobody is typing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.typing.is_empty()
    }

    /// Indicator line for display, e.g. `"Bob, Carol are typing..."`.
    #[must_use]
    pub fn display_text(&self) -> Option<String> {
        if self.typing.is_empty() {
            return None;
        }
        let names: Vec<&str> = self.typing.iter().map(Identity::as_str).collect();
        let verb = if names.len() == 1 { "is" } else { "are" };
        Some(format!("{} {verb} typing...", names.join(", ")))
    }
}

/// Local typing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypingState {
    /// No typing signal outstanding.
    #[default]
    Idle,
    /// A start signal went out and the debounce deadline is pending.
    Active,
}

/// Signal the engine must emit for the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    /// Emit `typing`.
    Start,
    /// Emit `stopTyping`.
    Stop,
}

/// Debounced local typing state machine.
///
/// `Active` exactly when a deadline is pending. Arming a new deadline
/// replaces the old one, so at most one is ever outstanding.
#[derive(Debug, Clone)]
pub struct TypingSignaler {
    debounce: Duration,
    deadline: Option<Instant>,
}

impl TypingSignaler {
    /// Create an idle signaler with the given quiet period.
    #[must_use]
    pub const fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: None,
        }
    }

    /// Record local input at `now`.
    ///
    /// Returns [`TypingSignal::Start`] on the `Idle` -> `Active` transition;
    /// while already `Active` the deadline is pushed back and nothing is
    /// emitted.
    pub fn on_input(&mut self, now: Instant) -> Option<TypingSignal> {
        let was_idle = self.deadline.is_none();
        self.deadline = Some(now + self.debounce);
        was_idle.then_some(TypingSignal::Start)
    }

    /// Fire the deadline if it has passed by `now`.
    pub fn expire(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Cancel the pending deadline immediately.
    ///
    /// Returns [`TypingSignal::Stop`] if the signaler was `Active`.
    pub fn force_stop(&mut self) -> Option<TypingSignal> {
        self.deadline.take().map(|_| TypingSignal::Stop)
    }

    /// The pending deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TypingState {
        if self.deadline.is_some() {
            TypingState::Active
        } else {
            TypingState::Idle
        }
    }
}
