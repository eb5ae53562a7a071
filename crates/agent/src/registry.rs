//! Per-channel runtime state owned by one mediator.

use std::collections::{HashMap, HashSet, VecDeque};

use parley_core::channel::ChannelMessage;
use parley_memory::MemoryStore;
use parley_security::RateBucket;

/// Canonical messages remembered per channel.
pub const CHANNEL_HISTORY_LIMIT: usize = 50;

/// Participants are the unique authors of this many newest messages.
pub const PARTICIPANT_WINDOW: usize = 20;

/// Memory, rate buckets, in-flight slots, dedup markers and message
/// history, keyed by channel id.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    memory: MemoryStore,
    rate_buckets: HashMap<String, RateBucket>,
    in_flight: HashSet<String>,
    last_handled: HashMap<String, String>,
    history: HashMap<String, VecDeque<ChannelMessage>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    /// Remember an incoming message, keeping the newest
    /// [`CHANNEL_HISTORY_LIMIT`] per channel.
    pub fn remember(&mut self, message: &ChannelMessage) {
        let history = self.history.entry(message.channel_id.clone()).or_default();
        history.push_back(message.clone());
        while history.len() > CHANNEL_HISTORY_LIMIT {
            history.pop_front();
        }
    }

    pub fn history_len(&self, channel_id: &str) -> usize {
        self.history.get(channel_id).map_or(0, VecDeque::len)
    }

    /// History rendered as `author: content`, oldest first.
    pub fn snapshot(&self, channel_id: &str) -> Vec<String> {
        self.history
            .get(channel_id)
            .map(|h| h.iter().map(|m| format!("{}: {}", m.author, m.content)).collect())
            .unwrap_or_default()
    }

    /// Unique non-empty authors of the last [`PARTICIPANT_WINDOW`] messages,
    /// in order of first appearance.
    pub fn participants(&self, channel_id: &str) -> Vec<String> {
        let Some(history) = self.history.get(channel_id) else {
            return vec![];
        };

        let skip = history.len().saturating_sub(PARTICIPANT_WINDOW);
        let mut seen = HashSet::new();
        history
            .iter()
            .skip(skip)
            .map(|m| m.author.trim())
            .filter(|a| !a.is_empty() && seen.insert(a.to_string()))
            .map(str::to_string)
            .collect()
    }

    pub fn is_in_flight(&self, channel_id: &str) -> bool {
        self.in_flight.contains(channel_id)
    }

    /// Claim the channel's in-flight slot. `false` if already taken.
    pub fn begin(&mut self, channel_id: &str) -> bool {
        self.in_flight.insert(channel_id.to_string())
    }

    pub fn finish(&mut self, channel_id: &str) {
        self.in_flight.remove(channel_id);
    }

    pub fn was_handled(&self, channel_id: &str, message_id: &str) -> bool {
        self.last_handled.get(channel_id).is_some_and(|id| id == message_id)
    }

    pub fn mark_handled(&mut self, channel_id: &str, message_id: &str) {
        self.last_handled.insert(channel_id.to_string(), message_id.to_string());
    }

    /// Admit one invocation against the channel's sliding window.
    pub fn try_acquire_rate(&mut self, channel_id: &str, max_per_minute: u32, now_ms: i64) -> bool {
        self.rate_buckets
            .entry(channel_id.to_string())
            .or_default()
            .try_acquire(max_per_minute, now_ms)
    }

    pub fn rate_bucket(&self, channel_id: &str) -> Option<&RateBucket> {
        self.rate_buckets.get(channel_id)
    }
}
