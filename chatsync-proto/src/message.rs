//! Message and identity types shared by every chatsync participant.
//!
//! The serialized field names (`username`, `message`, `timestamp`) are fixed
//! by the server's `message` event and must not change.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors produced when validating a locally chosen identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// The identity was empty or contained only whitespace.
    #[error("identity must contain at least one non-whitespace character")]
    Blank,
}

/// A participant's display name.
///
/// Identities received from the server are accepted as-is; only the local
/// identity is validated, through [`Identity::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Validate a locally chosen display name.
    ///
    /// The name is kept exactly as typed; surrounding whitespace is only
    /// considered when deciding whether the name is blank.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Blank`] if `raw` trims to an empty string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, IdentityError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(IdentityError::Blank);
        }
        Ok(Self(raw))
    }

    /// Wrap a name reported by the server without validation.
    pub fn from_wire(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Return the display name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Identity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identity {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// UTC instant carried on the wire as an ISO-8601 string with millisecond
/// precision (`2024-05-01T10:00:00.000Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing UTC date-time.
    #[must_use]
    pub const fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Return the inner date-time.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Render in the wire format.
    #[must_use]
    pub fn to_iso_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso_string())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}

/// A chat message as it travels over the `message` event.
///
/// Immutable once created: the engine never edits a message after it has
/// been appended to a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The author's display name.
    pub username: Identity,
    /// Message body, as typed.
    pub message: String,
    /// When the author sent the message.
    pub timestamp: Timestamp,
}

impl ChatMessage {
    /// Create a message stamped with the current time.
    pub fn new(author: Identity, body: impl Into<String>) -> Self {
        Self {
            username: author,
            message: body.into(),
            timestamp: Timestamp::now(),
        }
    }

    /// Whether the body contains anything besides whitespace.
    #[must_use]
    pub fn has_content(&self) -> bool {
        !self.message.trim().is_empty()
    }
}
