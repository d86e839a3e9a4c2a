//! Chat and response event types
//!
//! A [`ChatEvent`] is what the chat source produces; an [`OutboundMessage`]
//! is what the gateway emits back to its caller (UI, log sink, relay).

use chrono::{DateTime, Utc};

/// A single message received from the live chat feed
#[derive(Debug, Clone)]
pub struct ChatEvent {
    /// Display name of the author
    pub author: String,

    /// Message text with emoji tokens in `:name:` surface form
    pub message: String,

    /// When the message was posted
    pub timestamp: DateTime<Utc>,
}

impl ChatEvent {
    /// Create an event timestamped now
    #[must_use]
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Classification of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Raw chat message forwarded to the caller
    User,
    /// Generated persona reply
    AiResponse,
    /// Spam-flagged message (shown for moderation, never read aloud)
    Spam,
    /// Gateway status notice
    System,
    /// Processing failure surfaced to the caller
    Error,
}

/// A message emitted by the gateway to its response sink
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Author label ("persona name", "システム", or the original author)
    pub author: String,

    /// Message text
    pub message: String,

    /// Emission time
    pub timestamp: DateTime<Utc>,

    /// Message classification
    pub kind: MessageKind,
}

impl OutboundMessage {
    /// Build a message of the given kind timestamped now
    #[must_use]
    pub fn new(author: impl Into<String>, message: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Build a system notice
    #[must_use]
    pub fn system(message: impl Into<String>) -> Self {
        Self::new("システム", message, MessageKind::System)
    }

    /// Build an error notice
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("システム", message, MessageKind::Error)
    }
}
