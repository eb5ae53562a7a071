//! Data model for invocation lifecycle trace events.

use chrono::{DateTime, Utc};
use parley_core::ErrorCategory;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Event type ────────────────────────────────────────────────────────────

/// The lifecycle step an event describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    /// A message passed the invocation gate.
    InvocationReceived,
    /// Blocked content or a policy refusal.
    PolicyBlocked,
    ModelRequestStart,
    ModelRequestEnd,
    ToolCallStart,
    ToolCallEnd,
    /// The invocation failed.
    Error,
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvocationReceived => write!(f, "invocation_received"),
            Self::PolicyBlocked => write!(f, "policy_blocked"),
            Self::ModelRequestStart => write!(f, "model_request_start"),
            Self::ModelRequestEnd => write!(f, "model_request_end"),
            Self::ToolCallStart => write!(f, "tool_call_start"),
            Self::ToolCallEnd => write!(f, "tool_call_end"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────────

/// One recorded lifecycle event. Never mutated after recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Shared by every event of one invocation attempt.
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: TraceEventType,
    /// Backend name (e.g. "local", "online").
    pub provider: String,
    /// Active mode when the event was recorded.
    pub mode: String,
    pub retry_count: u32,
    pub latency_ms: u64,
    pub token_estimate_prompt: u64,
    pub token_estimate_completion: u64,
    pub token_estimate_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TraceEvent {
    /// Create an event with zeroed measurements.
    pub fn new(
        trace_id: impl Into<String>,
        event_type: TraceEventType,
        provider: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Self {
            trace_id: trace_id.into(),
            timestamp: Utc::now(),
            event_type,
            provider: provider.into(),
            mode: mode.into(),
            retry_count: 0,
            latency_ms: 0,
            token_estimate_prompt: 0,
            token_estimate_completion: 0,
            token_estimate_total: 0,
            error_category: None,
            details: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set prompt/completion estimates; the total is their sum.
    pub fn with_tokens(mut self, prompt: u64, completion: u64) -> Self {
        self.token_estimate_prompt = prompt;
        self.token_estimate_completion = completion;
        self.token_estimate_total = prompt + completion;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_error(mut self, category: ErrorCategory) -> Self {
        self.error_category = Some(category);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Generate a fresh trace id for one invocation attempt.
pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}
