//! Transcript message type.

use std::time::SystemTime;

use recall_compaction::Compactable;
use recall_primitives::{MessageId, SessionKey};
use serde::{Deserialize, Serialize};

/// A single utterance recorded in a session transcript.
///
/// Messages are immutable once built; stores and caches hold value copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    session_key: SessionKey,
    content: String,
    is_user_authored: bool,
    timestamp: SystemTime,
}

impl Message {
    /// Creates a builder for a message in `session_key`.
    #[must_use]
    pub fn builder(session_key: SessionKey, content: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            id: MessageId::random(),
            session_key,
            content: content.into(),
            is_user_authored: false,
            timestamp: SystemTime::now(),
        }
    }

    /// Returns the unique identifier for this message.
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the session the message belongs to.
    #[must_use]
    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    /// Returns the message text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns `true` when a human wrote the message.
    #[must_use]
    pub fn is_user_authored(&self) -> bool {
        self.is_user_authored
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

impl Compactable for Message {
    fn text(&self) -> &str {
        &self.content
    }

    fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// Builder type used to assemble [`Message`] instances.
#[derive(Debug)]
pub struct MessageBuilder {
    id: MessageId,
    session_key: SessionKey,
    content: String,
    is_user_authored: bool,
    timestamp: SystemTime,
}

impl MessageBuilder {
    /// Overrides the message identifier.
    #[must_use]
    pub fn id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    /// Marks the message as written by a user (`true`) or the agent.
    #[must_use]
    pub fn user_authored(mut self, is_user_authored: bool) -> Self {
        self.is_user_authored = is_user_authored;
        self
    }

    /// Sets the timestamp for the message.
    #[must_use]
    pub fn timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Finalises the builder.
    #[must_use]
    pub fn build(self) -> Message {
        Message {
            id: self.id,
            session_key: self.session_key,
            content: self.content,
            is_user_authored: self.is_user_authored,
            timestamp: self.timestamp,
        }
    }
}
