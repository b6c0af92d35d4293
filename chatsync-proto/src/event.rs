//! Named events exchanged with the chat server.
//!
//! | Event         | Direction          | Payload                      |
//! |---------------|--------------------|------------------------------|
//! | `setUsername` | outbound           | identity string              |
//! | `message`     | outbound / inbound | [`ChatMessage`]              |
//! | `typing`      | outbound / inbound | identity string              |
//! | `stopTyping`  | outbound / inbound | identity string              |
//! | `onlineUsers` | inbound            | ordered list of identities   |

use std::fmt;

use serde_json::Value;

use crate::message::{ChatMessage, Identity};

/// Wire names of every event the protocol knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Announce the local identity.
    SetUsername,
    /// A chat message.
    Message,
    /// Someone started typing.
    Typing,
    /// Someone stopped typing.
    StopTyping,
    /// Full presence snapshot.
    OnlineUsers,
}

impl EventName {
    /// The exact string used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetUsername => "setUsername",
            Self::Message => "message",
            Self::Typing => "typing",
            Self::StopTyping => "stopTyping",
            Self::OnlineUsers => "onlineUsers",
        }
    }

    /// Look up a wire name. Returns `None` for names this client ignores.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "setUsername" => Some(Self::SetUsername),
            "message" => Some(Self::Message),
            "typing" => Some(Self::Typing),
            "stopTyping" => Some(Self::StopTyping),
            "onlineUsers" => Some(Self::OnlineUsers),
            _ => None,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Register the local identity with the server.
    SetUsername(Identity),
    /// Broadcast a message; the server fans it out to every participant.
    Message(ChatMessage),
    /// The local user started typing.
    Typing(Identity),
    /// The local user stopped typing.
    StopTyping(Identity),
}

impl OutboundEvent {
    /// The wire name of this event.
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::SetUsername(_) => EventName::SetUsername,
            Self::Message(_) => EventName::Message,
            Self::Typing(_) => EventName::Typing,
            Self::StopTyping(_) => EventName::StopTyping,
        }
    }

    /// Serialize the payload to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns the underlying `serde_json` error if the payload cannot be
    /// represented as JSON.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::SetUsername(id) | Self::Typing(id) | Self::StopTyping(id) => {
                serde_json::to_value(id)
            }
            Self::Message(msg) => serde_json::to_value(msg),
        }
    }
}

/// Events the server delivers to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Any participant's message, including the echo of our own.
    Message(ChatMessage),
    /// A remote participant started typing.
    Typing(Identity),
    /// A participant stopped typing.
    StopTyping(Identity),
    /// Complete list of online participants, replacing any earlier list.
    OnlineUsers(Vec<Identity>),
}

impl InboundEvent {
    /// The wire name of this event.
    #[must_use]
    pub const fn name(&self) -> EventName {
        match self {
            Self::Message(_) => EventName::Message,
            Self::Typing(_) => EventName::Typing,
            Self::StopTyping(_) => EventName::StopTyping,
            Self::OnlineUsers(_) => EventName::OnlineUsers,
        }
    }

    /// Build an inbound event from its wire name and JSON payload.
    ///
    /// Returns `Ok(None)` for names that are not inbound events of this
    /// protocol (including `setUsername`, which only flows outbound).
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the payload does not have the
    /// shape the named event requires.
    pub fn from_parts(name: &str, payload: Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match EventName::from_wire(name) {
            Some(EventName::Message) => Self::Message(serde_json::from_value(payload)?),
            Some(EventName::Typing) => Self::Typing(serde_json::from_value(payload)?),
            Some(EventName::StopTyping) => Self::StopTyping(serde_json::from_value(payload)?),
            Some(EventName::OnlineUsers) => Self::OnlineUsers(serde_json::from_value(payload)?),
            Some(EventName::SetUsername) | None => return Ok(None),
        };
        Ok(Some(event))
    }
}
