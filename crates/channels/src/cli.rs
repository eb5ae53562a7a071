//! CLI channel — interactive terminal-based chat.
//!
//! Reads stdin line by line and writes replies to stdout. Used by
//! `parley chat`. In text mode every line becomes a message from the
//! local user in one channel; in JSON mode every line is a raw host event
//! passed through the canonical adapter.

use async_trait::async_trait;
use chrono::Utc;
use parley_core::channel::{ChannelMessage, MessageSource, ReplySink};
use parley_core::error::ChannelError;
use std::io::Write;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::adapter;

/// How stdin lines are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineFormat {
    #[default]
    Text,
    /// One raw JSON message event per line
    Json,
}

/// Interactive CLI message source.
#[derive(Debug, Clone)]
pub struct CliChannel {
    channel_id: String,
    guild_id: Option<String>,
    author: String,
    format: LineFormat,
}

impl CliChannel {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            guild_id: None,
            author: "User".into(),
            format: LineFormat::Text,
        }
    }

    pub fn with_guild(mut self, guild_id: Option<String>) -> Self {
        self.guild_id = guild_id;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_format(mut self, format: LineFormat) -> Self {
        self.format = format;
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Turn one input line into a message. `None` for blank lines.
    pub fn parse_line(&self, line: &str) -> Option<Result<ChannelMessage, ChannelError>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        Some(match self.format {
            LineFormat::Json => adapter::parse_event(line),
            LineFormat::Text => Ok(ChannelMessage {
                id: uuid::Uuid::new_v4().to_string(),
                channel_id: self.channel_id.clone(),
                guild_id: self.guild_id.clone(),
                author: self.author.clone(),
                author_id: Some("local_user".into()),
                author_role_ids: vec![],
                content: line.to_string(),
                timestamp: Utc::now(),
                attachments: vec![],
            }),
        })
    }
}

/// Lines that end the session.
pub fn is_exit_command(line: &str) -> bool {
    matches!(line.trim(), "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl MessageSource for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let source = self.clone();
        tracing::debug!(channel = %self.channel_id, format = ?self.format, "CLI source started");

        tokio::spawn(async move {
            let stdin = io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if is_exit_command(&line) {
                            break;
                        }
                        let Some(item) = source.parse_line(&line) else {
                            continue;
                        };
                        if tx.send(item).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Prints replies to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl ReplySink for StdoutSink {
    async fn send(&self, channel_id: &str, content: &str) -> Result<(), ChannelError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "\n[{channel_id}] agent: {content}\n").map_err(|e| ChannelError::DeliveryFailed {
            channel: channel_id.to_string(),
            reason: e.to_string(),
        })?;
        out.flush().map_err(|e| ChannelError::DeliveryFailed {
            channel: channel_id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_properties() {
        let ch = CliChannel::new("cli").with_guild(Some("G1".into())).with_author("alice");
        assert_eq!(ch.name(), "cli");
        assert_eq!(ch.channel_id(), "cli");
    }

    #[test]
    fn text_lines_become_messages() {
        let ch = CliChannel::new("C1").with_author("alice");
        let msg = ch.parse_line("  @agent hi  ").unwrap().unwrap();
        assert_eq!(msg.channel_id, "C1");
        assert_eq!(msg.author, "alice");
        assert_eq!(msg.content, "@agent hi");
        assert!(!msg.id.is_empty());

        let other = ch.parse_line("@agent again").unwrap().unwrap();
        assert_ne!(msg.id, other.id);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let ch = CliChannel::new("C1");
        assert!(ch.parse_line("   ").is_none());
    }

    #[test]
    fn json_lines_use_the_adapter() {
        let ch = CliChannel::new("ignored").with_format(LineFormat::Json);
        let msg = ch
            .parse_line(r#"{"message":{"id":"m1","channel_id":"C7","content":"!agent go"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg.channel_id, "C7");

        let err = ch.parse_line(r#"{"message":{"content":"no ids"}}"#).unwrap().unwrap_err();
        assert!(matches!(err, ChannelError::InvalidPayload(_)));
    }

    #[test]
    fn exit_commands() {
        assert!(is_exit_command("quit"));
        assert!(is_exit_command(" /exit "));
        assert!(!is_exit_command("/trace"));
    }

    #[tokio::test]
    async fn stdout_sink_accepts_replies() {
        StdoutSink.send("C1", "hello").await.unwrap();
    }
}
