//! Policy engine: guild/channel scoping, required roles and tool access.
//!
//! Evaluation order is guild scope, then channel scope, then required roles.
//! The first failing check decides the reason.

use parley_config::{AgentSettings, PolicySettings, Precedence};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where an invocation comes from.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext<'a> {
    pub guild_id: Option<&'a str>,
    pub channel_id: Option<&'a str>,
    pub invoker_role_ids: &'a [String],
}

/// Why an invocation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyBlockReason {
    Guild,
    Channel,
    Roles,
}

impl std::fmt::Display for PolicyBlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Roles => "roles",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    Denied { reason: PolicyBlockReason },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Stateless evaluator over [`PolicySettings`].
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn check(policy: &PolicySettings, context: &PolicyContext<'_>) -> PolicyDecision {
        let precedence = policy.precedence;

        if !evaluate_scope(
            context.guild_id,
            &policy.allowed_guild_ids,
            &policy.denied_guild_ids,
            precedence,
        ) {
            return PolicyDecision::Denied {
                reason: PolicyBlockReason::Guild,
            };
        }

        if !evaluate_scope(
            context.channel_id,
            &policy.allowed_channel_ids,
            &policy.denied_channel_ids,
            precedence,
        ) {
            return PolicyDecision::Denied {
                reason: PolicyBlockReason::Channel,
            };
        }

        let Some(required) = required_roles(policy, context) else {
            return PolicyDecision::Allowed;
        };

        if context.invoker_role_ids.iter().any(|role| required.contains(role)) {
            PolicyDecision::Allowed
        } else {
            PolicyDecision::Denied {
                reason: PolicyBlockReason::Roles,
            }
        }
    }
}

/// Decide one scope.
///
/// Listed in both sets → precedence decides. Only denied → refused.
/// Non-empty allow-set → the id must be listed (a missing id is refused).
/// Empty allow-set → unrestricted.
pub fn evaluate_scope(
    id: Option<&str>,
    allowed: &BTreeSet<String>,
    denied: &BTreeSet<String>,
    precedence: Precedence,
) -> bool {
    let in_allowed = id.is_some_and(|id| allowed.contains(id));
    let in_denied = id.is_some_and(|id| denied.contains(id));

    if in_allowed && in_denied {
        return precedence == Precedence::Allow;
    }
    if in_denied {
        return false;
    }
    if allowed.is_empty() {
        return true;
    }
    in_allowed
}

/// Roles required in this context: exact channel, then exact guild, then `*`.
pub fn required_roles<'p>(policy: &'p PolicySettings, context: &PolicyContext<'_>) -> Option<&'p BTreeSet<String>> {
    let map = &policy.required_invoker_roles;
    context
        .channel_id
        .and_then(|id| map.get(id))
        .or_else(|| context.guild_id.and_then(|id| map.get(id)))
        .or_else(|| map.get("*"))
        .filter(|roles| !roles.is_empty())
}

/// Whether the model may call tools in this channel.
///
/// Both lists empty means no channel may use tools.
pub fn tool_access(settings: &AgentSettings, channel_id: &str, guild_id: Option<&str>) -> bool {
    settings.tool_enabled_channels.contains(channel_id)
        || guild_id.is_some_and(|g| settings.tool_enabled_guilds.contains(g))
}
