//! Built-in tool implementations for Parley.
//!
//! Every tool here is read-only: it looks at the channel snapshot in the
//! [`ToolContext`](parley_core::ToolContext) and never writes anywhere.

pub mod list_participants;
pub mod recent_messages;
pub mod summarize_thread;

use parley_core::tool::ToolRegistry;

pub use list_participants::ListParticipantsTool;
pub use recent_messages::FetchRecentMessagesTool;
pub use summarize_thread::SummarizeThreadTool;

/// Create a registry with all read-safe tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FetchRecentMessagesTool));
    registry.register(Box::new(SummarizeThreadTool));
    registry.register(Box::new(ListParticipantsTool));
    registry
}

/// Read an optional numeric `limit` argument, floored and clamped.
///
/// Anything that is not a number falls back to `default`.
pub(crate) fn limit_arg(arguments: &serde_json::Value, min: u64, max: u64, default: u64) -> usize {
    let limit = match arguments.get("limit").and_then(|v| v.as_f64()) {
        Some(n) if n.is_finite() => (n.floor().max(0.0) as u64).clamp(min, max),
        _ => default,
    };
    limit as usize
}
