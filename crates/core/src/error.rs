//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant, and every error maps to
//! an [`ErrorCategory`] used by diagnostics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify this error for trace events and logs.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(e) => e.category(),
            Self::Channel(_) => ErrorCategory::Delivery,
            Self::Tool(_) => ErrorCategory::ToolExecution,
            Self::Config { .. } => ErrorCategory::ProviderUnavailable,
            Self::Serialization(_) => ErrorCategory::Internal,
        }
    }
}

/// Diagnostic classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invocation refused by guild/channel/role policy or blocked content.
    PolicyBlocked,
    /// Invocation dropped by the per-channel rate window.
    RateLimited,
    /// Missing credential or backend configuration.
    ProviderUnavailable,
    /// Transport failure or timeout talking to the backend.
    Network,
    /// Backend answered without content and without tool requests.
    MalformedResponse,
    /// Backend answered with a non-success status.
    ProviderError,
    /// A tool call failed.
    ToolExecution,
    /// The reply sink rejected the answer.
    Delivery,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PolicyBlocked => "policy_blocked",
            Self::RateLimited => "rate_limited",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Network => "network",
            Self::MalformedResponse => "malformed_response",
            Self::ProviderError => "provider_error",
            Self::ToolExecution => "tool_execution",
            Self::Delivery => "delivery",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ApiError { .. } => ErrorCategory::ProviderError,
            Self::NotConfigured(_) => ErrorCategory::ProviderUnavailable,
            Self::Timeout(_) | Self::Network(_) => ErrorCategory::Network,
            Self::MalformedResponse(_) => ErrorCategory::MalformedResponse,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid message payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}
