//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.

use parley_core::ChatMessage;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate tokens for a single message, counted over `role:author:content`.
pub fn estimate_message_tokens(message: &ChatMessage) -> usize {
    let author = message.author.as_deref().unwrap_or("");
    // role + two separators + author + content
    let chars = message.role.as_str().chars().count() + 2 + author.chars().count() + message.content.chars().count();
    chars.div_ceil(4)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
