//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley chat agent
//! mediator. This crate has **zero framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the message
//! source, the reply sink, the LLM client and the tools. Implementations
//! live in their respective crates. This enables:
//! - Swapping LLM backends via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod channel;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{Attachment, ChannelMessage, MessageSource, ReplySink};
pub use error::{Error, ErrorCategory, Result};
pub use message::{ChatMessage, MAX_MESSAGE_CHARS, Role};
pub use provider::{GenerationOptions, PromptTurn, Provider, ProviderResponse, ToolDefinition};
pub use tool::{Tool, ToolContext, ToolOutput, ToolRegistry, ToolRequest, ToolResult};
