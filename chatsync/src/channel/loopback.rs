//! Loopback channel for testing.
//!
//! Created via [`LoopbackChannel::create_pair`], which returns the client
//! end, its inbound event stream, and a [`LoopbackServer`] that plays the
//! remote server: it pushes inbound events, records every outbound event
//! in order, and can simulate a dropped connection.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use chatsync_proto::event::{InboundEvent, OutboundEvent};

use super::{ChannelError, ChannelKind, ConnectionChannel, InboundReceiver};

/// State shared by both ends of the loopback.
#[derive(Debug)]
struct Wire {
    connected: bool,
    outbound: Vec<OutboundEvent>,
}

/// Client end of an in-process channel.
pub struct LoopbackChannel {
    wire: Arc<Mutex<Wire>>,
}

/// Server end of an in-process channel.
pub struct LoopbackServer {
    wire: Arc<Mutex<Wire>>,
    inbound: Option<mpsc::Sender<InboundEvent>>,
}

impl LoopbackChannel {
    /// Create a connected client/server pair.
    ///
    /// The `buffer` parameter controls the inbound queue capacity (at least one).
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use chatsync::channel::ConnectionChannel;
    /// use chatsync::channel::loopback::LoopbackChannel;
    /// use chatsync_proto::event::{InboundEvent, OutboundEvent};
    /// use chatsync_proto::message::Identity;
    ///
    /// # async fn example() {
    /// let (channel, mut inbound, server) = LoopbackChannel::create_pair(32);
    /// let ann = Identity::parse("Ann").unwrap();
    /// channel.emit(OutboundEvent::SetUsername(ann.clone())).unwrap();
    /// assert_eq!(server.take_outbound(), vec![OutboundEvent::SetUsername(ann)]);
    ///
    /// server.push(InboundEvent::OnlineUsers(vec![])).await.unwrap();
    /// assert!(inbound.recv().await.is_some());
    /// # }
    /// ```
    #[must_use]
    pub fn create_pair(buffer: usize) -> (Self, InboundReceiver, LoopbackServer) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let wire = Arc::new(Mutex::new(Wire {
            connected: true,
            outbound: Vec::new(),
        }));

        let channel = Self {
            wire: Arc::clone(&wire),
        };
        let server = LoopbackServer {
            wire,
            inbound: Some(tx),
        };
        (channel, rx, server)
    }
}

impl ConnectionChannel for LoopbackChannel {
    fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        let mut wire = self.wire.lock();
        if !wire.connected {
            return Err(ChannelError::Disconnected);
        }
        wire.outbound.push(event);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.wire.lock().connected
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Loopback
    }
}

impl LoopbackServer {
    /// Deliver an inbound event to the client, waiting for queue space.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Disconnected`] after [`disconnect`](Self::disconnect)
    /// or once the client's receiver has been dropped.
    pub async fn push(&self, event: InboundEvent) -> Result<(), ChannelError> {
        let tx = self.inbound.as_ref().ok_or(ChannelError::Disconnected)?;
        tx.send(event).await.map_err(|_| ChannelError::Disconnected)
    }

    /// Deliver an inbound event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Disconnected`] if the link is down or the
    /// queue is full.
    pub fn try_push(&self, event: InboundEvent) -> Result<(), ChannelError> {
        let tx = self.inbound.as_ref().ok_or(ChannelError::Disconnected)?;
        tx.try_send(event).map_err(|_| ChannelError::Disconnected)
    }

    /// Remove and return every outbound event recorded so far, in order.
    #[must_use]
    pub fn take_outbound(&self) -> Vec<OutboundEvent> {
        std::mem::take(&mut self.wire.lock().outbound)
    }

    /// Copy of the outbound events recorded so far, in order.
    #[must_use]
    pub fn outbound(&self) -> Vec<OutboundEvent> {
        self.wire.lock().outbound.clone()
    }

    /// Simulate a dropped connection.
    ///
    /// The client's inbound stream ends once queued events are drained, and
    /// later emits fail with [`ChannelError::Disconnected`].
    pub fn disconnect(&mut self) {
        self.wire.lock().connected = false;
        self.inbound = None;
    }
}
