//! Invocation gate: does this message address the agent, and is it safe to forward?

use serde::{Deserialize, Serialize};

/// Sensitive-data markers that block a message from reaching the model.
///
/// Matching is a case-insensitive substring test. The list is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedMarker {
    TokenColon,
    Password,
    CreditCard,
}

impl BlockedMarker {
    pub const ALL: [BlockedMarker; 3] = [Self::TokenColon, Self::Password, Self::CreditCard];

    /// The lowercase needle searched for.
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::TokenColon => "token:",
            Self::Password => "password",
            Self::CreditCard => "credit card",
        }
    }
}

/// True when the message addresses the agent.
///
/// Matches `@mention` anywhere, or a leading invocation prefix, or a leading
/// `/mention`. Case-insensitive; leading whitespace ignored. An empty mention
/// or prefix never matches.
pub fn is_invocation(content: &str, mention_name: &str, invocation_prefix: &str) -> bool {
    let lowered = content.trim().to_lowercase();
    if lowered.is_empty() {
        return false;
    }

    let mention = mention_name.trim().trim_start_matches('@').to_lowercase();
    if !mention.is_empty()
        && (lowered.contains(&format!("@{mention}")) || lowered.starts_with(&format!("/{mention}")))
    {
        return true;
    }

    let prefix = invocation_prefix.trim().to_lowercase();
    !prefix.is_empty() && lowered.starts_with(&prefix)
}

/// The first blocked marker found in `content`, if any.
pub fn find_blocked_marker(content: &str) -> Option<BlockedMarker> {
    let lowered = content.to_lowercase();
    BlockedMarker::ALL
        .into_iter()
        .find(|marker| lowered.contains(marker.pattern()))
}

/// False when the content carries sensitive data.
pub fn is_allowed(content: &str) -> bool {
    find_blocked_marker(content).is_none()
}
