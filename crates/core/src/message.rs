//! Chat message domain types.
//!
//! These are the value objects that flow through conversation memory:
//! a user invokes the agent → the turn is recorded → the assistant's reply is
//! recorded after delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept from any message body.
pub const MAX_MESSAGE_CHARS: usize = 1200;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// A channel participant
    User,
    /// The AI assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn of channel conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message
    pub role: Role,

    /// Display name of the speaker, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// The text content, at most [`MAX_MESSAGE_CHARS`] characters
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Create a message, truncating the content to the storage cap.
    pub fn new(role: Role, author: Option<String>, content: &str) -> Self {
        Self {
            role,
            author,
            content: truncate_chars(content, MAX_MESSAGE_CHARS),
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a user message.
    pub fn user(author: impl Into<String>, content: &str) -> Self {
        Self::new(Role::User, Some(author.into()), content)
    }

    /// Create an assistant message.
    pub fn assistant(author: impl Into<String>, content: &str) -> Self {
        Self::new(Role::Assistant, Some(author.into()), content)
    }

    /// Create a system message.
    pub fn system(content: &str) -> Self {
        Self::new(Role::System, None, content)
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Re-apply the storage cap (for messages built field by field).
    pub fn capped(mut self) -> Self {
        if self.content.chars().count() > MAX_MESSAGE_CHARS {
            self.content = truncate_chars(&self.content, MAX_MESSAGE_CHARS);
        }
        self
    }
}

/// Keep at most `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
