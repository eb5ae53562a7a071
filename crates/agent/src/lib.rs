//! The orchestration core of Parley.
//!
//! For every message that reaches the agent:
//!
//! 1. **Remember** it in the channel history
//! 2. **Gate** it (enabled, invoked, dedup, allowed content, policy,
//!    in-flight, rate window)
//! 3. **Build** the prompt from channel memory
//! 4. **Orchestrate**: ask the model, resolve tool requests, ask again,
//!    for at most three rounds
//! 5. **Deliver** the answer and record it as an assistant turn
//!
//! Every step of an attempt is recorded in the trace recorder under one
//! trace id.

pub mod mediator;
pub mod orchestrator;
pub mod registry;

pub use mediator::{AgentMediator, InvocationOutcome, SkipReason};
pub use orchestrator::{
    MAX_TOOL_ROUNDS, Orchestration, OrchestrationError, OrchestrationRequest, TokenUsage, ToolOrchestrator,
};
pub use registry::{CHANNEL_HISTORY_LIMIT, ChannelRegistry, PARTICIPANT_WINDOW};
