//! Security for Parley: invocation gating, policy, rate limiting and tool auditing.
//!
//! Provides:
//! - **Gate**: Invocation detection and the sensitive-content blocklist
//! - **Policy**: Guild/channel allow/deny scoping, required roles, tool access
//! - **Rate limiting**: Per-channel sliding one-minute window
//! - **Audit logging**: Capped log of tool calls with pluggable sinks

pub mod audit;
pub mod gate;
pub mod policy;
pub mod rate_limit;

pub use audit::{AuditSink, ToolAuditEntry, ToolAuditLog, ToolCallStatus, TracingSink};
pub use gate::{BlockedMarker, find_blocked_marker, is_allowed, is_invocation};
pub use policy::{PolicyBlockReason, PolicyContext, PolicyDecision, PolicyEngine, tool_access};
pub use rate_limit::{RateBucket, RateDecision, WINDOW_MS, apply_window};
