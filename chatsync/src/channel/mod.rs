//! Connection channel abstraction for chatsync.
//!
//! Defines the [`ConnectionChannel`] trait the engine emits outbound events
//! through. Inbound events travel the other way as an ordered
//! [`InboundReceiver`] handed out when a channel is created.
//! Concrete implementations:
//! - [`loopback::LoopbackChannel`]: in-process channel for tests
//! - [`ws::WsChannel`]: Socket.IO over WebSocket

pub mod loopback;
pub mod ws;

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use chatsync_proto::event::{InboundEvent, OutboundEvent};
use chatsync_proto::packet::CodecError;

/// Ordered stream of inbound events produced by a channel.
///
/// The stream ends (yields `None`) once the channel is disconnected.
pub type InboundReceiver = mpsc::Receiver<InboundEvent>;

/// Describes which kind of channel is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Socket.IO over WebSocket.
    WebSocket,
    /// In-process loopback for testing.
    Loopback,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => write!(f, "WebSocket"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors that can occur on a connection channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel is not connected; the event was dropped.
    #[error("channel disconnected")]
    Disconnected,

    /// Connecting or the protocol handshake took too long.
    #[error("channel operation timed out")]
    Timeout,

    /// The server rejected or broke the protocol handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The underlying connection failed.
    #[error("connection error: {0}")]
    Io(String),
}

/// Tunables shared by channel implementations.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Upper bound on connecting plus the protocol handshake.
    pub connect_timeout: Duration,
    /// Capacity of the inbound event queue. Zero is treated as one.
    pub inbound_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            inbound_capacity: 256,
        }
    }
}

/// A persistent bidirectional event channel to one server endpoint.
///
/// Connection lifecycle belongs to the implementation. The engine only
/// needs to hand events over without blocking.
///
/// # Invariant
///
/// [`ConnectionChannel::emit`] never blocks and never panics. While the
/// channel is disconnected it returns [`ChannelError::Disconnected`] and
/// the event is dropped; buffering policy, if any, is the implementation's.
pub trait ConnectionChannel: Send {
    /// Queue an outbound event for delivery to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] if the event was not queued.
    fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError>;

    /// Whether the channel currently has a live connection.
    fn is_connected(&self) -> bool;

    /// Return the kind of this channel.
    fn kind(&self) -> ChannelKind;
}

impl<C: ConnectionChannel + ?Sized> ConnectionChannel for Box<C> {
    fn emit(&self, event: OutboundEvent) -> Result<(), ChannelError> {
        (**self).emit(event)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn kind(&self) -> ChannelKind {
        (**self).kind()
    }
}
