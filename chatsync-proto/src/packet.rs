//! Engine.IO v4 / Socket.IO v4 text packet codec.
//!
//! The chat server is a Socket.IO server, so every WebSocket text frame is
//! an Engine.IO packet whose first character is the packet type. Engine.IO
//! `message` packets (`4`) carry a Socket.IO packet whose own type follows:
//!
//! ```text
//! 0{"sid":..,"pingInterval":..}   open handshake        (server -> client)
//! 2 / 3                           ping / pong
//! 40                              namespace connect     (client -> server)
//! 40{"sid":..}                    connect acknowledged  (server -> client)
//! 42["typing","Bob"]              event with payload
//! ```
//!
//! Only the default namespace is used. Binary attachments and
//! acknowledgement callbacks are not part of the chat protocol.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::event::{InboundEvent, OutboundEvent};

/// Namespace connect request for the default namespace.
pub const CONNECT: &str = "40";

/// Engine.IO pong, the reply to a server ping.
pub const PONG: &str = "3";

/// Error type for packet encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame was empty.
    #[error("empty frame")]
    Empty,

    /// The packet type character is not defined by the protocol.
    #[error("unknown packet type {0:?}")]
    UnknownPacketType(char),

    /// The packet is valid but uses a feature this client does not speak.
    #[error("unsupported packet: {0}")]
    Unsupported(String),

    /// The frame structure is wrong.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session parameters announced by the server in the open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session identifier.
    pub sid: String,
    /// Interval between server pings, in milliseconds.
    #[serde(default)]
    pub ping_interval: u64,
    /// How long the server waits for a pong, in milliseconds.
    #[serde(default)]
    pub ping_timeout: u64,
}

impl Handshake {
    /// Longest silence that still counts as a live connection.
    #[must_use]
    pub const fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Engine.IO open handshake.
    Open(Handshake),
    /// Engine.IO close.
    Close,
    /// Engine.IO ping; must be answered with [`PONG`].
    Ping,
    /// Engine.IO pong.
    Pong,
    /// Engine.IO noop or upgrade; nothing to do.
    Noop,
    /// Socket.IO namespace connect acknowledgement.
    Connect,
    /// Socket.IO namespace disconnect.
    Disconnect,
    /// Socket.IO connect error with the server's message.
    ConnectError(String),
    /// A chat protocol event.
    Event(InboundEvent),
    /// An event whose name this client does not handle.
    UnknownEvent(String),
}

/// Encode an outbound event as a Socket.IO event frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload cannot be serialized.
pub fn encode_event(event: &OutboundEvent) -> Result<String, CodecError> {
    let args = Value::Array(vec![
        Value::String(event.name().as_str().to_string()),
        event.payload()?,
    ]);
    Ok(format!("42{}", serde_json::to_string(&args)?))
}

/// Decode one text frame.
///
/// Never panics, whatever the input.
///
/// # Errors
///
/// Returns [`CodecError`] when the frame is empty, has an unknown type, is
/// structurally malformed, or carries a payload of the wrong shape.
pub fn decode(frame: &str) -> Result<Packet, CodecError> {
    let (kind, rest) = split_type(frame).ok_or(CodecError::Empty)?;
    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket_packet(rest),
        '5' | '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

fn decode_socket_packet(body: &str) -> Result<Packet, CodecError> {
    let (kind, rest) = split_type(body)
        .ok_or_else(|| CodecError::Malformed("message packet without socket type".into()))?;
    let rest = strip_namespace(rest);
    match kind {
        '0' => Ok(Packet::Connect),
        '1' => Ok(Packet::Disconnect),
        '2' => decode_event(rest),
        '4' => Ok(Packet::ConnectError(connect_error_message(rest))),
        '3' | '5' | '6' => Err(CodecError::Unsupported(format!(
            "socket packet type {kind} (acks and binary events)"
        ))),
        other => Err(CodecError::UnknownPacketType(other)),
    }
}

fn decode_event(body: &str) -> Result<Packet, CodecError> {
    // An optional numeric ack id precedes the argument array.
    let args = body.trim_start_matches(|c: char| c.is_ascii_digit());
    let Value::Array(mut args) = serde_json::from_str(args)? else {
        return Err(CodecError::Malformed("event arguments are not an array".into()));
    };
    if args.is_empty() {
        return Err(CodecError::Malformed("event without a name".into()));
    }
    let payload = if args.len() > 1 {
        args.swap_remove(1)
    } else {
        Value::Null
    };
    let Value::String(name) = args.swap_remove(0) else {
        return Err(CodecError::Malformed("event name is not a string".into()));
    };

    match InboundEvent::from_parts(&name, payload)? {
        Some(event) => Ok(Packet::Event(event)),
        None => Ok(Packet::UnknownEvent(name)),
    }
}

fn connect_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ConnectErrorBody {
        message: String,
    }

    serde_json::from_str::<ConnectErrorBody>(body)
        .map_or_else(|_| body.to_string(), |b| b.message)
}

/// Skip a `/namespace,` prefix if present.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        body
    }
}

fn split_type(frame: &str) -> Option<(char, &str)> {
    let kind = frame.chars().next()?;
    Some((kind, &frame[kind.len_utf8()..]))
}
