//! Append-only message timeline.

use std::sync::Arc;

use chatsync_proto::message::ChatMessage;

/// Messages in arrival order.
///
/// Local optimistic echoes and server deliveries are appended alike; the
/// timeline never reorders by timestamp, never deduplicates, and never
/// drops entries.
///
/// Storage is reference counted so view snapshots share it. An append while
/// a snapshot is alive copies the list once; reads never copy.
#[derive(Debug, Clone, Default)]
pub struct MessageTimeline {
    messages: Arc<Vec<ChatMessage>>,
}

impl MessageTimeline {
    /// Create an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end.
    pub fn append(&mut self, message: ChatMessage) {
        Arc::make_mut(&mut self.messages).push(message);
    }

    /// A handle to the current messages that later appends do not affect.
    #[must_use]
    pub fn shared(&self) -> Arc<Vec<ChatMessage>> {
        Arc::clone(&self.messages)
    }

    /// Iterate over every message in insertion order.
    ///
    /// Each call starts from the beginning; the iterator is also `Clone`.
    pub fn all(&self) -> std::slice::Iter<'_, ChatMessage> {
        self.messages.iter()
    }

    /// The most recently appended message.
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no message has arrived yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
