//! The synchronization engine.
//!
//! [`SyncEngine`] owns every piece of mutable chat state (timeline, presence,
//! remote typing set, local typing signaler, compose buffer) and is the only
//! thing that mutates it. Local actions mutate state optimistically and emit
//! outbound events; inbound events are routed to the matching store.
//!
//! Every method is a discrete, non-blocking handler. The debounce deadline is
//! exposed through [`SyncEngine::typing_deadline`] so a scheduler (see
//! [`crate::session`]) can call [`SyncEngine::poll_typing_timer`] when it
//! elapses.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use chatsync_proto::event::{InboundEvent, OutboundEvent};
use chatsync_proto::message::{ChatMessage, Identity, IdentityError};

use crate::channel::ConnectionChannel;
use crate::presence::PresenceTracker;
use crate::timeline::MessageTimeline;
use crate::typing::{TypingAggregator, TypingSignal, TypingSignaler, TypingState};

/// Quiet period after the last keystroke before `stopTyping` goes out.
pub const DEFAULT_TYPING_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Errors returned by engine actions.
///
/// A rejected action leaves every store untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The requested identity was empty or whitespace-only.
    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    /// `join` was called on a session that already has an identity.
    #[error("session already joined as {0}")]
    AlreadyJoined(Identity),
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Debounce window for local typing signals.
    pub typing_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            typing_debounce: DEFAULT_TYPING_DEBOUNCE,
        }
    }
}

/// Whether a local identity has been established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No identity yet; sends are ignored.
    #[default]
    Unjoined,
    /// Identity fixed for the rest of the session.
    Joined,
}

/// Result of a send attempt. Neither non-`Sent` case is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was appended and emitted.
    Sent,
    /// The body was empty or whitespace-only; nothing happened.
    Empty,
    /// The session has not joined yet; nothing happened.
    NotJoined,
}

/// Read-only copy of the engine state for presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    /// Session lifecycle state.
    pub session: SessionState,
    /// The local identity once joined.
    pub identity: Option<Identity>,
    /// All messages in arrival order, shared with the engine until the next
    /// append.
    pub timeline: Arc<Vec<ChatMessage>>,
    /// Latest presence snapshot.
    pub online: Vec<Identity>,
    /// Remote participants currently typing, in the order they started.
    pub typing: Vec<Identity>,
    /// Ready-made typing indicator line.
    pub typing_text: Option<String>,
    /// Unsent text in the compose box.
    pub compose: String,
    /// Local typing signal state.
    pub local_typing: TypingState,
    /// Whether the channel reports a live connection.
    pub connected: bool,
}

/// Event-driven chat state machine bound to one [`ConnectionChannel`].
pub struct SyncEngine<C: ConnectionChannel> {
    /// Outbound half of the server connection.
    channel: C,
    state: SessionState,
    identity: Option<Identity>,
    /// Inbound events are only applied while attached.
    attached: bool,
    compose: String,
    timeline: MessageTimeline,
    presence: PresenceTracker,
    typing: TypingAggregator,
    signaler: TypingSignaler,
    /// Bumped on every change a [`ViewState`] can observe, except the
    /// channel's connection flag.
    revision: u64,
}

impl<C: ConnectionChannel> SyncEngine<C> {
    /// Create an unjoined, detached engine.
    pub fn new(channel: C, config: EngineConfig) -> Self {
        Self {
            channel,
            state: SessionState::Unjoined,
            identity: None,
            attached: false,
            compose: String::new(),
            timeline: MessageTimeline::new(),
            presence: PresenceTracker::new(),
            typing: TypingAggregator::new(),
            signaler: TypingSignaler::new(config.typing_debounce),
            revision: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Local actions
    // -----------------------------------------------------------------------

    /// Establish the local identity and announce it with `setUsername`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::AlreadyJoined`] if the session already has an identity.
    /// - [`EngineError::InvalidIdentity`] if `name` trims to empty.
    pub fn join(&mut self, name: &str) -> Result<(), EngineError> {
        if let Some(current) = &self.identity {
            tracing::warn!(identity = %current, "join rejected: session already joined");
            return Err(EngineError::AlreadyJoined(current.clone()));
        }
        let identity = Identity::parse(name)?;

        self.identity = Some(identity.clone());
        self.state = SessionState::Joined;
        self.touch();
        tracing::info!(identity = %identity, "joined session");
        self.emit(OutboundEvent::SetUsername(identity));
        Ok(())
    }

    /// Send a message with optimistic local echo.
    ///
    /// Appends the message to the timeline, emits `message`, clears the
    /// compose buffer, then forces typing off: the debounce deadline is
    /// cancelled and `stopTyping` is emitted whether or not it was pending.
    pub fn send_message(&mut self, body: &str) -> SendOutcome {
        let Some(identity) = self.identity.clone() else {
            tracing::debug!("send ignored: session not joined");
            return SendOutcome::NotJoined;
        };
        let message = ChatMessage::new(identity.clone(), body);
        if !message.has_content() {
            return SendOutcome::Empty;
        }

        self.timeline.append(message.clone());
        self.emit(OutboundEvent::Message(message));
        self.compose.clear();

        self.signaler.force_stop();
        self.emit(OutboundEvent::StopTyping(identity));
        self.touch();
        SendOutcome::Sent
    }

    /// Record local keystrokes.
    ///
    /// Replaces the compose buffer with `raw`. Once joined, the first input
    /// after going idle emits `typing`; every input re-arms the single
    /// debounce deadline.
    pub fn on_local_input(&mut self, raw: &str) {
        if self.compose != raw {
            raw.clone_into(&mut self.compose);
            self.touch();
        }

        let Some(identity) = self.identity.clone() else {
            return;
        };
        if let Some(TypingSignal::Start) = self.signaler.on_input(Instant::now()) {
            self.touch();
            self.emit(OutboundEvent::Typing(identity));
        }
    }

    /// Append text to the compose buffer without signalling typing
    /// (emoji-picker insertion).
    pub fn insert_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.compose.push_str(text);
            self.touch();
        }
    }

    /// Send whatever is in the compose buffer.
    pub fn submit(&mut self) -> SendOutcome {
        let body = self.compose.clone();
        self.send_message(&body)
    }

    /// Fire the debounce deadline if it has elapsed.
    ///
    /// Returns `true` if `stopTyping` was emitted.
    pub fn poll_typing_timer(&mut self) -> bool {
        if self.signaler.expire(Instant::now()).is_none() {
            return false;
        }
        self.touch();
        if let Some(identity) = self.identity.clone() {
            self.emit(OutboundEvent::StopTyping(identity));
        }
        true
    }

    /// The pending debounce deadline, if the local user is typing.
    #[must_use]
    pub const fn typing_deadline(&self) -> Option<Instant> {
        self.signaler.deadline()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start applying inbound events.
    pub fn attach(&mut self) {
        if self.attached {
            tracing::debug!("attach ignored: already attached");
            return;
        }
        self.attached = true;
        tracing::debug!(identity = ?self.identity, "inbound handlers attached");
    }

    /// Stop applying inbound events and cancel the debounce deadline.
    ///
    /// If the local user was still marked typing, a final `stopTyping` is
    /// emitted so peers do not keep a stale indicator.
    pub fn detach(&mut self) {
        if self.signaler.force_stop().is_some() {
            self.touch();
            if let Some(identity) = self.identity.clone() {
                self.emit(OutboundEvent::StopTyping(identity));
            }
        }
        if self.attached {
            self.attached = false;
            tracing::debug!("inbound handlers detached");
        }
    }

    /// Whether inbound events are currently applied.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    // -----------------------------------------------------------------------
    // Inbound routing
    // -----------------------------------------------------------------------

    /// Route one inbound event to its store.
    ///
    /// Returns `true` if any state changed. Events arriving while detached
    /// are dropped.
    pub fn handle_inbound(&mut self, event: InboundEvent) -> bool {
        if !self.attached {
            tracing::trace!(event = %event.name(), "dropping inbound event while detached");
            return false;
        }

        let changed = match event {
            InboundEvent::Message(message) => {
                tracing::debug!(from = %message.username, "message received");
                self.timeline.append(message);
                true
            }
            InboundEvent::Typing(user) => {
                self.identity.as_ref() != Some(&user) && self.typing.add(user)
            }
            InboundEvent::StopTyping(user) => self.typing.remove(&user),
            InboundEvent::OnlineUsers(users) => {
                tracing::debug!(count = users.len(), "presence snapshot");
                self.presence.replace(users);
                true
            }
        };
        if changed {
            self.touch();
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    /// Session lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The local identity once joined.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The message timeline.
    #[must_use]
    pub const fn timeline(&self) -> &MessageTimeline {
        &self.timeline
    }

    /// The latest presence snapshot.
    #[must_use]
    pub const fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Remote typing set.
    #[must_use]
    pub const fn typing(&self) -> &TypingAggregator {
        &self.typing
    }

    /// Local typing state.
    #[must_use]
    pub const fn typing_state(&self) -> TypingState {
        self.signaler.state()
    }

    /// Current compose buffer.
    #[must_use]
    pub fn compose(&self) -> &str {
        &self.compose
    }

    /// Counter that moves whenever a fresh [`snapshot`](Self::snapshot)
    /// could differ from the last one, apart from the connection flag.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// The channel this engine emits through.
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Copy the current state for presentation.
    #[must_use]
    pub fn snapshot(&self) -> ViewState {
        ViewState {
            session: self.state,
            identity: self.identity.clone(),
            timeline: self.timeline.shared(),
            online: self.presence.users().to_vec(),
            typing: self.typing.users().to_vec(),
            typing_text: self.typing.display_text(),
            compose: self.compose.clone(),
            local_typing: self.signaler.state(),
            connected: self.channel.is_connected(),
        }
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Emit fire-and-forget: a disconnected channel drops the event.
    fn emit(&self, event: OutboundEvent) {
        let name = event.name();
        if let Err(e) = self.channel.emit(event) {
            tracing::debug!(event = %name, error = %e, "outbound event dropped");
        }
    }
}
