//! Guild/channel scoping and required-role settings.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which side wins when an id is both allowed and denied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precedence {
    Allow,
    #[default]
    Deny,
}

/// Allow/deny scoping plus role gating for agent invocations.
///
/// The empty allow-set means "unrestricted" for that scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    #[serde(default)]
    pub allowed_guild_ids: BTreeSet<String>,

    #[serde(default)]
    pub denied_guild_ids: BTreeSet<String>,

    #[serde(default)]
    pub allowed_channel_ids: BTreeSet<String>,

    #[serde(default)]
    pub denied_channel_ids: BTreeSet<String>,

    /// Scope (channel id, guild id or `*`) → role ids, any one of which
    /// is enough to invoke the agent in that scope.
    #[serde(default)]
    pub required_invoker_roles: BTreeMap<String, BTreeSet<String>>,

    #[serde(default)]
    pub precedence: Precedence,
}

impl PolicySettings {
    /// Trim every id and role, dropping empty keys and empty role sets.
    pub fn sanitize(&mut self) {
        self.allowed_guild_ids = sanitize_ids(&self.allowed_guild_ids);
        self.denied_guild_ids = sanitize_ids(&self.denied_guild_ids);
        self.allowed_channel_ids = sanitize_ids(&self.allowed_channel_ids);
        self.denied_channel_ids = sanitize_ids(&self.denied_channel_ids);

        let mut roles = BTreeMap::new();
        for (scope, role_ids) in &self.required_invoker_roles {
            let scope = scope.trim();
            let role_ids = sanitize_ids(role_ids);
            if scope.is_empty() || role_ids.is_empty() {
                continue;
            }
            roles
                .entry(scope.to_string())
                .or_insert_with(BTreeSet::new)
                .extend(role_ids);
        }
        self.required_invoker_roles = roles;
    }
}

/// Trim ids and drop the ones that end up empty.
pub(crate) fn sanitize_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    ids.into_iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn precedence_defaults_to_deny() {
        let policy = PolicySettings::default();
        assert_eq!(policy.precedence, Precedence::Deny);
    }

    #[test]
    fn sanitize_trims_and_drops_empty() {
        let mut policy = PolicySettings {
            allowed_channel_ids: set(&[" C1 ", "", "C1"]),
            ..Default::default()
        };
        policy.required_invoker_roles.insert(" * ".into(), set(&[" mod", "  "]));
        policy.required_invoker_roles.insert("G1".into(), set(&["   "]));
        policy.required_invoker_roles.insert("  ".into(), set(&["admin"]));

        policy.sanitize();

        assert_eq!(policy.allowed_channel_ids, set(&["C1"]));
        assert_eq!(policy.required_invoker_roles.len(), 1);
        assert_eq!(policy.required_invoker_roles["*"], set(&["mod"]));
    }

    #[test]
    fn parses_from_toml() {
        let policy: PolicySettings = toml::from_str(
            r#"
            allowed_channel_ids = ["C1"]
            precedence = "allow"

            [required_invoker_roles]
            "*" = ["mod"]
            "#,
        )
        .unwrap();
        assert!(policy.allowed_channel_ids.contains("C1"));
        assert_eq!(policy.precedence, Precedence::Allow);
        assert!(policy.required_invoker_roles["*"].contains("mod"));
    }
}
