//! Tool audit log. Records every tool call the model asked for.
//!
//! Entries are kept newest first and capped; each one is also forwarded to
//! the configured sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Entries kept in memory.
pub const TOOL_AUDIT_CAPACITY: usize = 100;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    pub tool_name: String,
    /// Short human-readable description of the outcome
    pub summary: String,
    pub status: ToolCallStatus,
}

/// Outcome of an audited tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Ok,
    Error,
    /// Tool use is not enabled for the channel/guild
    Blocked,
}

/// Trait for audit log sinks (where entries are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &ToolAuditEntry);
}

/// In-memory, capped tool audit log.
pub struct ToolAuditLog {
    entries: Mutex<VecDeque<ToolAuditEntry>>,
    capacity: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for ToolAuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAuditLog")
            .field("entry_count", &self.count())
            .field("capacity", &self.capacity)
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for ToolAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolAuditLog {
    /// Create a new audit log with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Create a new audit log with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: TOOL_AUDIT_CAPACITY,
            sinks,
        }
    }

    /// Record a tool call outcome.
    pub fn log(
        &self,
        channel_id: &str,
        guild_id: Option<&str>,
        tool_name: &str,
        status: ToolCallStatus,
        summary: impl Into<String>,
    ) {
        let entry = ToolAuditEntry {
            timestamp: Utc::now(),
            channel_id: channel_id.into(),
            guild_id: guild_id.map(str::to_string),
            tool_name: tool_name.into(),
            summary: summary.into(),
            status,
        };

        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.push_front(entry.clone());
            entries.truncate(self.capacity);
        }

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// All entries, newest first.
    pub fn entries(&self) -> Vec<ToolAuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Entries with the given status, newest first.
    pub fn entries_by_status(&self, status: ToolCallStatus) -> Vec<ToolAuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.status == status)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &ToolAuditEntry) {
        tracing::info!(
            tool = %entry.tool_name,
            channel = %entry.channel_id,
            guild = ?entry.guild_id,
            status = ?entry.status,
            summary = %entry.summary,
            "TOOL AUDIT"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn newest_entry_comes_first() {
        let log = ToolAuditLog::new();
        log.log("C1", None, "list_participants", ToolCallStatus::Ok, "2 participants");
        log.log("C1", Some("G1"), "summarize_thread", ToolCallStatus::Error, "bad limit");

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tool_name, "summarize_thread");
        assert_eq!(entries[0].guild_id.as_deref(), Some("G1"));
        assert_eq!(entries[1].tool_name, "list_participants");
    }

    #[test]
    fn capped_at_capacity() {
        let log = ToolAuditLog::new();
        for i in 0..(TOOL_AUDIT_CAPACITY + 25) {
            log.log("C1", None, &format!("tool_{i}"), ToolCallStatus::Ok, "");
        }
        assert_eq!(log.count(), TOOL_AUDIT_CAPACITY);
        let last = TOOL_AUDIT_CAPACITY + 24;
        assert_eq!(log.entries()[0].tool_name, format!("tool_{last}"));
    }

    #[test]
    fn filter_by_status() {
        let log = ToolAuditLog::new();
        log.log("C1", None, "a", ToolCallStatus::Ok, "");
        log.log("C1", None, "b", ToolCallStatus::Blocked, "tool use disabled");
        log.log("C2", None, "c", ToolCallStatus::Ok, "");

        assert_eq!(log.entries_by_status(ToolCallStatus::Ok).len(), 2);
        let blocked = log.entries_by_status(ToolCallStatus::Blocked);
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].tool_name, "b");
    }

    #[test]
    fn clear_entries() {
        let log = ToolAuditLog::new();
        log.log("C1", None, "a", ToolCallStatus::Ok, "");
        assert_eq!(log.count(), 1);
        log.clear();
        assert_eq!(log.count(), 0);
    }

    #[test]
    fn entry_serializes_status_snake_case() {
        let log = ToolAuditLog::new();
        log.log("C1", None, "a", ToolCallStatus::Blocked, "");
        let json = serde_json::to_string(&log.entries()[0]).unwrap();
        assert!(json.contains("\"status\":\"blocked\""));
        assert!(!json.contains("guild_id"));
    }

    #[test]
    fn custom_sink_receives_entries() {
        struct TestSink {
            received: Arc<Mutex<Vec<String>>>,
        }

        impl AuditSink for TestSink {
            fn record(&self, entry: &ToolAuditEntry) {
                self.received.lock().unwrap().push(entry.tool_name.clone());
            }
        }

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = TestSink {
            received: received.clone(),
        };
        let log = ToolAuditLog::with_sinks(vec![Box::new(sink), Box::new(TracingSink)]);

        log.log("C1", None, "fetch_recent_channel_messages", ToolCallStatus::Ok, "12 messages");

        let got = received.lock().unwrap();
        assert_eq!(got.as_slice(), ["fetch_recent_channel_messages"]);
    }

    #[test]
    fn debug_format() {
        let log = ToolAuditLog::new();
        let debug_str = format!("{log:?}");
        assert!(debug_str.contains("ToolAuditLog"));
        assert!(debug_str.contains("entry_count"));
    }
}
