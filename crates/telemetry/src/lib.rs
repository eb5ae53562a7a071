//! Invocation tracing for Parley.
//!
//! Records every lifecycle step of an agent invocation (gate, policy, model
//! requests, tool calls, failures) into a capped ring buffer that diagnostics
//! can read or subscribe to. Independent of the `tracing` log output.

pub mod model;
pub mod recorder;

pub use model::{TraceEvent, TraceEventType, new_trace_id};
pub use recorder::{Subscription, TRACE_CAPACITY, TraceRecorder};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
