//! Session actor: runs a [`SyncEngine`] on a tokio runtime.
//!
//! One task owns the engine and serializes every mutation through it:
//!
//! ```text
//! presentation ── SessionHandle ──► commands ─┐
//! channel ───────────────────────► inbound ──┼─► Session task ─► SyncEngine
//! debounce deadline ─────────────► timer ────┘          │
//! presentation ◄──────────────── watch<ViewState> ◄─────┘
//! ```
//!
//! Each command, inbound event, or timer firing runs to completion before the
//! next is picked up, and a fresh [`ViewState`] is published after every
//! step that changed something visible.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::channel::{ConnectionChannel, InboundReceiver};
use crate::engine::{EngineError, SendOutcome, SyncEngine, ViewState};

/// Errors returned by [`SessionHandle`] calls.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The engine rejected the action.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The session task is no longer running.
    #[error("session closed")]
    Closed,
}

/// Requests from the handle to the session task. Every request carries a
/// reply so the caller knows its handler has run.
#[derive(Debug)]
enum Command {
    Join(String, oneshot::Sender<Result<(), EngineError>>),
    Send(String, oneshot::Sender<SendOutcome>),
    Input(String, oneshot::Sender<()>),
    Insert(String, oneshot::Sender<()>),
    Submit(oneshot::Sender<SendOutcome>),
    Shutdown,
}

/// The actor that owns a [`SyncEngine`].
pub struct Session<C: ConnectionChannel> {
    engine: SyncEngine<C>,
    inbound: InboundReceiver,
    commands: mpsc::Receiver<Command>,
    view: watch::Sender<ViewState>,
    /// Engine revision and connection flag behind the last published view.
    published: (u64, bool),
}

impl<C: ConnectionChannel + 'static> Session<C> {
    /// Attach `engine` to `inbound` and start the session task.
    ///
    /// `capacity` bounds the command queue; zero is treated as one. Must be
    /// called from within a tokio runtime.
    pub fn spawn(engine: SyncEngine<C>, inbound: InboundReceiver, capacity: usize) -> SessionHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(capacity.max(1));
        let (view_tx, view_rx) = watch::channel(engine.snapshot());
        let published = (engine.revision(), engine.channel().is_connected());

        let session = Self {
            engine,
            inbound,
            commands: cmd_rx,
            view: view_tx,
            published,
        };
        let task = tokio::spawn(session.run());

        SessionHandle {
            commands: cmd_tx,
            view: view_rx,
            task,
        }
    }

    async fn run(mut self) {
        self.engine.attach();
        self.publish();
        let mut inbound_open = true;

        loop {
            let deadline = self.engine.typing_deadline();
            tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.apply(cmd),
                },
                event = self.inbound.recv(), if inbound_open => match event {
                    Some(event) => {
                        self.engine.handle_inbound(event);
                    }
                    None => {
                        inbound_open = false;
                        tracing::info!("inbound stream ended; local actions still accepted");
                    }
                },
                () = typing_timer(deadline) => {
                    self.engine.poll_typing_timer();
                }
            }
            self.publish();
        }

        self.engine.detach();
        self.publish();
        tracing::info!("session task exiting");
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Join(name, reply) => {
                let _ = reply.send(self.engine.join(&name));
            }
            Command::Send(body, reply) => {
                let _ = reply.send(self.engine.send_message(&body));
            }
            Command::Input(raw, reply) => {
                self.engine.on_local_input(&raw);
                let _ = reply.send(());
            }
            Command::Insert(text, reply) => {
                self.engine.insert_text(&text);
                let _ = reply.send(());
            }
            Command::Submit(reply) => {
                let _ = reply.send(self.engine.submit());
            }
            Command::Shutdown => {}
        }
    }

    /// Publish a fresh snapshot if anything visible changed.
    fn publish(&mut self) {
        let seen = (self.engine.revision(), self.engine.channel().is_connected());
        if seen == self.published {
            return;
        }
        self.published = seen;

        let snapshot = self.engine.snapshot();
        self.view.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Completes at `deadline`; never completes when there is none.
async fn typing_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Presentation-side handle to a running [`Session`].
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<ViewState>,
    task: tokio::task::JoinHandle<()>,
}

impl SessionHandle {
    /// Join the session under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Engine`] if the engine rejects the identity or
    /// the session already joined, [`SessionError::Closed`] if the task is gone.
    pub async fn join(&self, name: impl Into<String>) -> Result<(), SessionError> {
        let name = name.into();
        self.request(|reply| Command::Join(name, reply)).await??;
        Ok(())
    }

    /// Send `body` as a message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the task is gone.
    pub async fn send_message(&self, body: impl Into<String>) -> Result<SendOutcome, SessionError> {
        let body = body.into();
        self.request(|reply| Command::Send(body, reply)).await
    }

    /// Report the compose box contents after a keystroke.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the task is gone.
    pub async fn input(&self, raw: impl Into<String>) -> Result<(), SessionError> {
        let raw = raw.into();
        self.request(|reply| Command::Input(raw, reply)).await
    }

    /// Append text (an emoji, say) to the compose box.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the task is gone.
    pub async fn insert_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::Insert(text, reply)).await
    }

    /// Send the compose box contents.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the task is gone.
    pub async fn submit(&self) -> Result<SendOutcome, SessionError> {
        self.request(Command::Submit).await
    }

    /// Subscribe to view snapshots.
    #[must_use]
    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.view.clone()
    }

    /// Whether the session task is still accepting commands.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Detach the engine and wait for the session task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the task ended abnormally.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        // Already-stopped tasks are fine; we only care that it is gone.
        let _ = self.commands.send(Command::Shutdown).await;
        self.task.await.map_err(|e| {
            tracing::warn!(error = %e, "session task did not exit cleanly");
            SessionError::Closed
        })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}
