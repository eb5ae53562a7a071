//! Channel traits — the abstraction over the chat host.
//!
//! A message source delivers canonical chat events to the mediator, and a
//! reply sink delivers the agent's final answer back into the conversation.
//! Both are external collaborators; the core only consumes these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// A canonical chat event received from the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Host-assigned message id
    pub id: String,

    /// The channel this message belongs to
    pub channel_id: String,

    /// The guild (server/workspace) the channel belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,

    /// Human-readable author name
    pub author: String,

    /// Platform-specific author id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,

    /// Role ids held by the author in this guild
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author_role_ids: Vec<String>,

    /// The text content
    pub content: String,

    pub timestamp: DateTime<Utc>,

    /// Attachments (images, files, etc.)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// An attachment in a channel message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// File size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A stream of incoming chat events.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Human-readable source name (e.g., "cli").
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    ///
    /// Returns a receiver that yields canonical messages. Payloads that fail
    /// validation arrive as `Err` so the consumer can log and skip them.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<ChannelMessage, ChannelError>>,
        ChannelError,
    >;

    /// Stop the source gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}

/// Delivers final reply text into a channel.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, channel_id: &str, content: &str) -> std::result::Result<(), ChannelError>;
}
