//! Conversation memory for Parley.
//!
//! Per-channel recent turns, a compacted rolling summary, and
//! token-budgeted prompt assembly.

pub mod store;
pub mod token;

pub use store::{ChannelMemoryState, Invocation, MemoryStore, PromptPayload};
pub use token::{estimate_message_tokens, estimate_messages_tokens, estimate_tokens};
