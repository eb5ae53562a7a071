//! Canonical message adapter for raw chat-host events.
//!
//! Hosts deliver loosely-typed JSON (ids as strings or numbers, optional
//! author fields, content that may be missing). Everything is deserialized
//! into optional fields first and then normalized into a
//! [`ChannelMessage`]. Events without an id or channel id are rejected.

use chrono::{DateTime, Utc};
use parley_core::channel::{Attachment, ChannelMessage};
use parley_core::error::ChannelError;
use serde::Deserialize;

/// An id the host may send as a string or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl RawId {
    fn into_string(self) -> Option<String> {
        let s = match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        };
        (!s.is_empty()).then_some(s)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAuthor {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    global_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMember {
    #[serde(default)]
    roles: Vec<RawId>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAttachment {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    channel_id: Option<RawId>,
    #[serde(default)]
    guild_id: Option<RawId>,
    #[serde(default)]
    author: Option<RawAuthor>,
    #[serde(default)]
    member: Option<RawMember>,
    #[serde(default)]
    content: Option<serde_json::Value>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    attachments: Option<Vec<RawAttachment>>,
}

/// Normalize one raw event.
///
/// Accepts either `{"message": {...}}` or the message object itself.
pub fn to_canonical(event: &serde_json::Value) -> Result<ChannelMessage, ChannelError> {
    let payload = match event.get("message") {
        Some(inner) if inner.is_object() => inner,
        _ => event,
    };

    if !payload.is_object() {
        return Err(ChannelError::InvalidPayload("event is not a JSON object".into()));
    }

    let raw: RawMessage = serde_json::from_value(payload.clone())
        .map_err(|e| ChannelError::InvalidPayload(format!("malformed message event: {e}")))?;

    let id = raw
        .id
        .and_then(RawId::into_string)
        .ok_or_else(|| ChannelError::InvalidPayload("missing message id".into()))?;
    let channel_id = raw
        .channel_id
        .and_then(RawId::into_string)
        .ok_or_else(|| ChannelError::InvalidPayload("missing channel_id".into()))?;

    let author = raw.author.unwrap_or_default();
    let author_name = non_empty(author.global_name)
        .or_else(|| non_empty(author.username))
        .unwrap_or_else(|| "unknown".to_string());

    let content = match raw.content {
        Some(serde_json::Value::String(s)) => s,
        _ => String::new(),
    };

    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let attachments = raw
        .attachments
        .unwrap_or_default()
        .into_iter()
        .map(|a| Attachment {
            id: a.id.and_then(RawId::into_string),
            filename: a.filename,
            url: a.url,
            content_type: a.content_type,
            size: a.size,
        })
        .collect();

    let author_role_ids = raw
        .member
        .unwrap_or_default()
        .roles
        .into_iter()
        .filter_map(RawId::into_string)
        .collect();

    Ok(ChannelMessage {
        id,
        channel_id,
        guild_id: raw.guild_id.and_then(RawId::into_string),
        author: author_name,
        author_id: author.id.and_then(RawId::into_string),
        author_role_ids,
        content,
        timestamp,
        attachments,
    })
}

/// Parse and normalize one JSON line.
pub fn parse_event(line: &str) -> Result<ChannelMessage, ChannelError> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| ChannelError::InvalidPayload(format!("invalid JSON: {e}")))?;
    to_canonical(&value)
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
