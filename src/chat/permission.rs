//! Permission gate over an external capability oracle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::presence::UserId;
use crate::channel::ChannelDefinition;

/// Operator level granted access when the oracle has no explicit answer.
pub const DEFAULT_FALLBACK_LEVEL: u8 = 2;

/// Boolean capability oracle. Queried on every gate check.
pub trait PermissionOracle: Send + Sync {
    /// Whether `user` holds `node`, or failing that, has at least
    /// `fallback_level`.
    fn has_permission(&self, user: &UserId, node: &str, fallback_level: u8) -> bool;
}

/// Decides channel access for a user.
#[derive(Clone)]
pub struct PermissionGate {
    oracle: Arc<dyn PermissionOracle>,
    fallback_level: u8,
}

impl PermissionGate {
    /// Create a gate with the default fallback level.
    pub fn new(oracle: Arc<dyn PermissionOracle>) -> Self {
        Self::with_fallback_level(oracle, DEFAULT_FALLBACK_LEVEL)
    }

    /// Create a gate with an explicit fallback level.
    pub fn with_fallback_level(oracle: Arc<dyn PermissionOracle>, fallback_level: u8) -> Self {
        Self {
            oracle,
            fallback_level,
        }
    }

    /// A gate that allows everything.
    pub fn allow_all() -> Self {
        Self::new(Arc::new(AllowAll))
    }

    /// Whether `user` may send to and receive from `channel`.
    pub fn can_use(&self, user: &UserId, channel: &ChannelDefinition) -> bool {
        match channel.required_permission() {
            None => true,
            Some(node) => {
                let allowed = self.oracle.has_permission(user, node, self.fallback_level);
                debug!(user = %user, node, allowed, "permission check");
                allowed
            }
        }
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("fallback_level", &self.fallback_level)
            .finish_non_exhaustive()
    }
}

struct AllowAll;

impl PermissionOracle for AllowAll {
    fn has_permission(&self, _user: &UserId, _node: &str, _fallback_level: u8) -> bool {
        true
    }
}

/// Node grants and operator levels keyed by user name, as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantTable {
    pub grants: HashMap<String, Vec<String>>,
    pub levels: HashMap<String, u8>,
}

#[derive(Debug, Default)]
struct Grants {
    nodes: HashMap<UserId, HashSet<String>>,
    levels: HashMap<UserId, u8>,
}

/// In-process permission table.
///
/// Grants may be changed at any time from any thread; changes take effect on
/// the next gate check.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    inner: RwLock<Grants>,
}

impl StaticPermissions {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from node grants and operator levels.
    pub fn from_maps(
        grants: &HashMap<String, Vec<String>>,
        levels: &HashMap<String, u8>,
    ) -> Self {
        let table = Self::new();
        table.replace(grants, levels);
        table
    }

    /// Replace every grant and level.
    pub fn replace(&self, grants: &HashMap<String, Vec<String>>, levels: &HashMap<String, u8>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.nodes = grants
            .iter()
            .map(|(user, nodes)| (UserId::new(user.as_str()), nodes.iter().cloned().collect()))
            .collect();
        inner.levels = levels
            .iter()
            .map(|(user, level)| (UserId::new(user.as_str()), *level))
            .collect();
    }

    /// Replace every grant and level from a configured table.
    pub fn apply(&self, table: &GrantTable) {
        self.replace(&table.grants, &table.levels);
    }

    /// Grant a node.
    pub fn grant(&self, user: &UserId, node: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .nodes
            .entry(user.clone())
            .or_default()
            .insert(node.to_string());
    }

    /// Revoke a node.
    pub fn revoke(&self, user: &UserId, node: &str) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(nodes) = inner.nodes.get_mut(user) {
            nodes.remove(node);
        }
    }

    /// Set the operator level of a user.
    pub fn set_level(&self, user: &UserId, level: u8) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.levels.insert(user.clone(), level);
    }
}

impl PermissionOracle for StaticPermissions {
    fn has_permission(&self, user: &UserId, node: &str, fallback_level: u8) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let granted = inner
            .nodes
            .get(user)
            .is_some_and(|nodes| nodes.contains(node));
        granted || inner.levels.get(user).is_some_and(|&l| l >= fallback_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staff() -> ChannelDefinition {
        ChannelDefinition::new("staff", "s", "[S]").with_permission("chat.staff")
    }

    #[test]
    fn test_public_channel_always_allowed() {
        let gate = PermissionGate::new(Arc::new(StaticPermissions::new()));
        let channel = ChannelDefinition::new("trade", "t", "[T]");
        assert!(gate.can_use(&UserId::new("alice"), &channel));
    }

    #[test]
    fn test_always_on_ignores_oracle() {
        let gate = PermissionGate::new(Arc::new(StaticPermissions::new()));
        let channel = staff().always_on();
        assert!(gate.can_use(&UserId::new("alice"), &channel));
    }

    #[test]
    fn test_grant_and_revoke() {
        let perms = Arc::new(StaticPermissions::new());
        let gate = PermissionGate::new(perms.clone());
        let alice = UserId::new("alice");

        assert!(!gate.can_use(&alice, &staff()));
        perms.grant(&alice, "chat.staff");
        assert!(gate.can_use(&alice, &staff()));
        perms.revoke(&alice, "chat.staff");
        assert!(!gate.can_use(&alice, &staff()));
    }

    #[test]
    fn test_fallback_level() {
        let perms = Arc::new(StaticPermissions::new());
        let gate = PermissionGate::new(perms.clone());
        let op = UserId::new("op");

        perms.set_level(&op, 1);
        assert!(!gate.can_use(&op, &staff()));
        perms.set_level(&op, DEFAULT_FALLBACK_LEVEL);
        assert!(gate.can_use(&op, &staff()));

        let strict = PermissionGate::with_fallback_level(perms, 4);
        assert!(!strict.can_use(&op, &staff()));
    }

    #[test]
    fn test_replace_from_maps() {
        let mut grants = HashMap::new();
        grants.insert("alice".to_string(), vec!["chat.staff".to_string()]);
        let perms = StaticPermissions::from_maps(&grants, &HashMap::new());
        let alice = UserId::new("alice");
        assert!(perms.has_permission(&alice, "chat.staff", 2));

        perms.replace(&HashMap::new(), &HashMap::new());
        assert!(!perms.has_permission(&alice, "chat.staff", 2));

        let mut table = GrantTable::default();
        table.levels.insert("alice".to_string(), 3);
        perms.apply(&table);
        assert!(perms.has_permission(&alice, "chat.staff", 2));
    }
}
