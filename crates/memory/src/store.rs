//! Per-channel rolling conversation memory.
//!
//! Each channel keeps its most recent turns verbatim and compacts older
//! turns into a short rolling summary. Prompt assembly selects as much
//! recent history as fits the token budget.

use parley_config::AgentSettings;
use parley_core::{ChatMessage, Role};
use serde::Serialize;
use std::collections::HashMap;

use crate::token::{estimate_message_tokens, estimate_messages_tokens, estimate_tokens};

/// Maximum participants remembered per channel.
pub const MAX_PARTICIPANTS: usize = 32;

/// Summary lines kept after each compaction.
pub const SUMMARY_MAX_LINES: usize = 8;

/// Characters kept per summary line body.
pub const SUMMARY_LINE_CHARS: usize = 220;

/// Floor for the history share of the prompt budget.
pub const MIN_HISTORY_BUDGET: usize = 200;

const BEHAVIOR_LINE: &str = "You are an AI participant in a shared chat channel. Reply succinctly and helpfully.";

/// Rolling state for one channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelMemoryState {
    pub recent_turns: Vec<ChatMessage>,
    pub rolling_summary: String,
    /// Ordered, unique, at most [`MAX_PARTICIPANTS`]
    pub last_participants: Vec<String>,
    pub turns_since_summary: u32,
}

/// Prompt text plus the history that fits alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPayload {
    pub prompt: String,
    /// Chronological
    pub history: Vec<ChatMessage>,
}

/// What the invoking message contributes to the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Invocation<'a> {
    pub content: &'a str,
    pub attachment_count: usize,
}

impl<'a> Invocation<'a> {
    pub fn new(content: &'a str) -> Self {
        Self {
            content,
            attachment_count: 0,
        }
    }

    pub fn with_attachments(mut self, count: usize) -> Self {
        self.attachment_count = count;
        self
    }
}

/// Channel-keyed memory. States are created lazily and live for the
/// lifetime of the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    channels: HashMap<String, ChannelMemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self, channel_id: &str) -> &mut ChannelMemoryState {
        self.channels.entry(channel_id.to_string()).or_default()
    }

    /// Read-only view of a channel's state, if it exists yet.
    pub fn state(&self, channel_id: &str) -> Option<&ChannelMemoryState> {
        self.channels.get(channel_id)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Record a turn.
    ///
    /// Keeps the newest `max(2 × memory_depth, 2)` turns. When `participants`
    /// is given and non-empty it replaces the remembered participant list.
    pub fn append_message(
        &mut self,
        channel_id: &str,
        message: ChatMessage,
        settings: &AgentSettings,
        participants: Option<&[String]>,
    ) {
        let max_turns = settings.max_recent_turns();
        let state = self.state_mut(channel_id);

        state.recent_turns.push(message.capped());
        if state.recent_turns.len() > max_turns {
            let excess = state.recent_turns.len() - max_turns;
            state.recent_turns.drain(..excess);
        }

        if let Some(participants) = participants.filter(|p| !p.is_empty()) {
            state.last_participants = unique_participants(participants);
        }

        state.turns_since_summary = state.turns_since_summary.saturating_add(1);
    }

    /// Compact the oldest half of the recent turns into the rolling summary
    /// when the turn counter or token budget says so.
    ///
    /// Returns whether a compaction happened.
    pub fn maybe_summarize(&mut self, channel_id: &str, settings: &AgentSettings) -> bool {
        let frequency = settings.effective_summary_frequency();
        let budget = settings.effective_token_budget();
        let state = self.state_mut(channel_id);

        let current_tokens = estimate_tokens(&state.rolling_summary) + estimate_messages_tokens(&state.recent_turns);
        if state.turns_since_summary < frequency && current_tokens < budget {
            return false;
        }

        if state.recent_turns.is_empty() {
            return false;
        }

        let compact_count = (state.recent_turns.len() / 2).max(1);
        let header = if state.rolling_summary.is_empty() {
            "Conversation summary:"
        } else {
            "Recent summary update:"
        };

        let mut digest: Vec<String> = Vec::with_capacity(compact_count + 2);
        if !state.rolling_summary.is_empty() {
            digest.push(state.rolling_summary.clone());
        }
        digest.push(header.to_string());
        digest.extend(state.recent_turns[..compact_count].iter().map(summary_line));

        state.rolling_summary = normalize_summary(&digest.join("\n"));
        state.recent_turns.drain(..compact_count);
        state.turns_since_summary = 0;

        tracing::debug!(
            channel = %channel_id,
            compacted = compact_count,
            remaining = state.recent_turns.len(),
            "Compacted channel memory"
        );
        true
    }

    /// Assemble the prompt and select budgeted history.
    ///
    /// History is picked newest-first while it fits
    /// `max(budget − tokens(prompt), 200)`; the newest turn is always kept.
    pub fn build_prompt_payload(
        &mut self,
        channel_id: &str,
        invocation: Invocation<'_>,
        settings: &AgentSettings,
    ) -> PromptPayload {
        let budget = settings.effective_token_budget();
        let state = self.state_mut(channel_id);

        let participants = if state.last_participants.is_empty() {
            "unknown".to_string()
        } else {
            state.last_participants.join(", ")
        };

        let mut sections = vec![
            format!("Channel ID: {channel_id}"),
            format!("Participants: {participants}"),
            BEHAVIOR_LINE.to_string(),
        ];
        if !state.rolling_summary.is_empty() {
            sections.push(format!("Rolling Summary:\n{}", state.rolling_summary));
        }
        sections.push(format!("User invocation: {}", invocation.content));
        if invocation.attachment_count > 0 {
            sections.push(format!("Attachment count: {}", invocation.attachment_count));
        }
        let prompt = sections.join("\n");

        let history_budget = budget.saturating_sub(estimate_tokens(&prompt)).max(MIN_HISTORY_BUDGET);
        let mut history = Vec::new();
        let mut used = 0usize;
        for message in state.recent_turns.iter().rev() {
            let cost = estimate_message_tokens(message);
            if !history.is_empty() && used + cost > history_budget {
                break;
            }
            history.push(message.clone());
            used += cost;
        }
        history.reverse();

        PromptPayload { prompt, history }
    }
}

/// `- speaker: content` with whitespace collapsed and the body capped.
fn summary_line(message: &ChatMessage) -> String {
    let speaker = message
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(match message.role {
            Role::Assistant => "Assistant",
            _ => "User",
        });
    let collapsed = message.content.split_whitespace().collect::<Vec<_>>().join(" ");
    let body: String = collapsed.chars().take(SUMMARY_LINE_CHARS).collect();
    format!("- {speaker}: {body}")
}

/// Trim lines, drop empty ones, keep the last [`SUMMARY_MAX_LINES`].
fn normalize_summary(summary: &str) -> String {
    let lines: Vec<&str> = summary.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(SUMMARY_MAX_LINES);
    lines[start..].join("\n")
}

/// The last [`MAX_PARTICIPANTS`] non-empty names, first occurrence order.
fn unique_participants(participants: &[String]) -> Vec<String> {
    let names: Vec<&str> = participants.iter().map(|p| p.as_str()).filter(|p| !p.is_empty()).collect();
    let start = names.len().saturating_sub(MAX_PARTICIPANTS);
    let mut unique: Vec<String> = Vec::new();
    for name in &names[start..] {
        if !unique.iter().any(|u| u == name) {
            unique.push((*name).to_string());
        }
    }
    unique
}
