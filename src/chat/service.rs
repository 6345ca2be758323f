//! Chat core: connected users, channel membership and focus.
//!
//! [`ChatCore`] is a synchronous state machine. It is owned by exactly one
//! task (see [`super::handle`]), so every multi-step operation runs without
//! interleaving. Effects are appended to an [`Outbox`].

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use super::outbox::Outbox;
use super::permission::{GrantTable, PermissionGate, StaticPermissions};
use super::presence::{OnlineUser, Position, UserId};
use super::state::{Focus, StoredChatState};
use crate::channel::{ChannelDefinition, ChannelRegistry};
use crate::error::ChatError;

/// Default token that replies to the last direct message.
pub const DEFAULT_DM_REPLY_TOKEN: &str = "d";

/// Default token that focuses the default channel.
pub const DEFAULT_GLOBAL_TOKEN: &str = "g";

/// Default separator between routing prefix and content.
pub const DEFAULT_PREFIX_SEPARATOR: &str = ":";

/// Default visible length cap for inbound relay lines.
pub const DEFAULT_RELAY_MAX_LENGTH: usize = 256;

/// Routing and relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    /// Prefix that replies to the last incoming direct message.
    pub dm_reply_token: String,
    /// Prefix that focuses the default channel.
    pub global_token: String,
    /// Separator between routing prefix and content.
    pub prefix_separator: String,
    /// Channel whose messages are sent to the relay.
    pub relay_channel: Option<String>,
    /// Prefix of inbound relay lines.
    pub relay_prefix: String,
    /// Separator between author and content of inbound relay lines.
    pub relay_separator: String,
    /// Visible length cap of inbound relay lines.
    pub relay_max_length: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            dm_reply_token: DEFAULT_DM_REPLY_TOKEN.to_string(),
            global_token: DEFAULT_GLOBAL_TOKEN.to_string(),
            prefix_separator: DEFAULT_PREFIX_SEPARATOR.to_string(),
            relay_channel: None,
            relay_prefix: "&9[Relay]".to_string(),
            relay_separator: "&7: &f".to_string(),
            relay_max_length: DEFAULT_RELAY_MAX_LENGTH,
        }
    }
}

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Newly joined.
    Joined,
    /// Was already a member.
    AlreadyJoined,
}

/// Owner of all live chat state.
pub struct ChatCore {
    pub(crate) registry: ChannelRegistry,
    pub(crate) gate: PermissionGate,
    pub(crate) settings: ChatSettings,
    pub(crate) users: BTreeMap<UserId, OnlineUser>,
    pub(crate) rng: StdRng,
    grant_table: Option<Arc<StaticPermissions>>,
}

impl ChatCore {
    /// Create a core seeded from the OS.
    pub fn new(registry: ChannelRegistry, gate: PermissionGate) -> Self {
        Self::with_rng(registry, gate, StdRng::from_os_rng())
    }

    /// Create a core with an explicit random source.
    pub fn with_rng(registry: ChannelRegistry, gate: PermissionGate, rng: StdRng) -> Self {
        Self {
            registry,
            gate,
            settings: ChatSettings::default(),
            users: BTreeMap::new(),
            rng,
            grant_table: None,
        }
    }

    /// Replace the routing settings.
    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Table that reloads carrying grants write to. Should be the table the
    /// gate's oracle reads.
    pub fn with_grant_table(mut self, table: Arc<StaticPermissions>) -> Self {
        self.grant_table = Some(table);
        self
    }

    /// Routing settings.
    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Current channel registry.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Permission gate.
    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    /// A connected user.
    pub fn user(&self, id: &UserId) -> Option<&OnlineUser> {
        self.users.get(id)
    }

    /// All connected users, ordered by id.
    pub fn users(&self) -> impl Iterator<Item = &OnlineUser> {
        self.users.values()
    }

    /// Whether a user is connected.
    pub fn is_online(&self, id: &UserId) -> bool {
        self.users.contains_key(id)
    }

    /// Number of connected users.
    pub fn online_count(&self) -> usize {
        self.users.len()
    }

    /// Find a connected user by display name or id, ignoring case.
    pub fn find_online_by_name(&self, name: &str) -> Option<UserId> {
        self.users
            .values()
            .find(|u| u.name.eq_ignore_ascii_case(name) || u.id.as_str().eq_ignore_ascii_case(name))
            .map(|u| u.id.clone())
    }

    /// Persistable state of a connected user.
    pub fn snapshot(&self, id: &UserId) -> Option<StoredChatState> {
        self.users.get(id).map(|u| u.state.to_stored())
    }

    /// Channel label for notices, falling back to the bare name.
    pub(crate) fn channel_label(&self, name: &str) -> String {
        self.registry
            .by_name(name)
            .map(ChannelDefinition::label)
            .unwrap_or_else(|| name.to_string())
    }

    /// Connect a user and restore their stored state.
    ///
    /// Stored channels missing from the registry are dropped, channels whose
    /// permission was lost are removed silently, and every always-on channel
    /// is joined. An unusable stored focus is repaired to the default channel.
    /// If no default can be resolved the user stays connected without focus
    /// and the error is returned.
    pub fn connect(
        &mut self,
        id: UserId,
        name: impl Into<String>,
        position: Position,
        stored: StoredChatState,
        out: &mut Outbox,
    ) -> Result<(), ChatError> {
        if self.users.contains_key(&id) {
            return Err(ChatError::AlreadyConnected(id));
        }

        let mut user = OnlineUser::new(id.clone(), name, position);
        for channel in self.registry.all() {
            if channel.always_on {
                user.state.join(&channel.name);
            } else if stored.joined.contains(&channel.name) {
                if self.gate.can_use(&id, channel) {
                    user.state.join(&channel.name);
                } else {
                    info!(
                        user = %id,
                        channel = %channel.name,
                        "Permission lost for saved channel on login, removing"
                    );
                }
            }
        }
        for name in stored.joined.iter().filter(|n| !self.registry.contains(n)) {
            debug!(user = %id, channel = %name, "Dropping saved channel that no longer exists");
        }

        if let Some(focus) = stored.focus.as_deref() {
            if user.state.is_joined(focus) {
                user.state.focus = Some(Focus::Channel(focus.to_string()));
            }
        }

        info!(user = %id, name = %user.name, "User connected to chat");
        self.users.insert(id.clone(), user);
        out.mark_dirty(&id);

        let result = if self.focused_channel(&id).is_none() {
            self.ensure_default_focus(&id, out).map(|_| ())
        } else {
            Ok(())
        };
        self.login_summary(&id, out);
        result
    }

    fn login_summary(&self, id: &UserId, out: &mut Outbox) {
        let Some(user) = self.users.get(id) else {
            return;
        };
        if let Some(channel) = user.state.focused_channel() {
            out.notice(id, &format!("Focused channel: {}", self.channel_label(channel)));
        }
        if !user.state.joined.is_empty() {
            out.notice(id, "Joined channels:");
            for channel in self.registry.all() {
                if user.state.is_joined(&channel.name) {
                    out.notice(id, &format!("  - {}", channel.label()));
                }
            }
        }
    }

    /// Disconnect a user, returning the state to persist.
    ///
    /// Other users focused on this user in direct messages are moved back to
    /// the default channel.
    pub fn disconnect(&mut self, id: &UserId, out: &mut Outbox) -> Option<StoredChatState> {
        let user = self.users.remove(id)?;
        info!(user = %id, "User disconnected from chat");

        let affected: Vec<UserId> = self
            .users
            .values()
            .filter(|u| matches!(&u.state.focus, Some(Focus::Direct(target)) if target == id))
            .map(|u| u.id.clone())
            .collect();

        for other in affected {
            if let Some(u) = self.users.get_mut(&other) {
                u.state.focus = None;
            }
            match self.ensure_default_focus(&other, out) {
                Ok(channel) => out.notice(
                    &other,
                    &format!(
                        "{} is no longer online. Focused channel: {}",
                        user.name,
                        self.channel_label(&channel)
                    ),
                ),
                Err(e) => error!(user = %other, "Cannot repair direct message focus: {}", e),
            }
        }

        Some(user.state.to_stored())
    }

    /// Update a user's position.
    pub fn move_user(&mut self, id: &UserId, position: Position) -> Result<(), ChatError> {
        let user = self
            .users
            .get_mut(id)
            .ok_or_else(|| ChatError::NotConnected(id.clone()))?;
        user.position = position;
        Ok(())
    }

    /// Focused channel of a user.
    pub fn focused_channel(&self, id: &UserId) -> Option<&str> {
        self.users.get(id).and_then(|u| u.state.focused_channel())
    }

    /// Gate check, join and focus. Returns whether the focus changed.
    pub(crate) fn apply_focus(
        &mut self,
        id: &UserId,
        name: &str,
        out: &mut Outbox,
    ) -> Result<bool, ChatError> {
        let channel = self
            .registry
            .by_name(name)
            .ok_or_else(|| ChatError::ChannelNotFound(name.to_string()))?;
        let user = self
            .users
            .get_mut(id)
            .ok_or_else(|| ChatError::NotConnected(id.clone()))?;
        if !self.gate.can_use(id, channel) {
            return Err(ChatError::PermissionDenied(name.to_string()));
        }

        let changed = !user.state.is_focused_on(name);
        if !user.state.is_joined(name) {
            info!(user = %id, channel = %name, "Joined channel");
        }
        user.state.focus_channel(name);
        out.mark_dirty(id);
        Ok(changed)
    }

    /// Focus the resolved default channel, joining it if needed.
    ///
    /// Returns the default channel name.
    pub fn ensure_default_focus(
        &mut self,
        id: &UserId,
        out: &mut Outbox,
    ) -> Result<String, ChatError> {
        let default = match self.registry.resolve_default() {
            Ok(channel) => channel.name.clone(),
            Err(e) => {
                error!(user = %id, "User needs focus reset, but no default channel available");
                return Err(e);
            }
        };
        info!(user = %id, channel = %default, "Focusing default channel");
        self.apply_focus(id, &default, out)?;
        Ok(default)
    }

    /// Join a channel.
    pub fn join(
        &mut self,
        id: &UserId,
        name: &str,
        out: &mut Outbox,
    ) -> Result<JoinOutcome, ChatError> {
        let channel = self
            .registry
            .by_name(name)
            .ok_or_else(|| ChatError::ChannelNotFound(name.to_string()))?;
        let user = self
            .users
            .get_mut(id)
            .ok_or_else(|| ChatError::NotConnected(id.clone()))?;

        if user.state.is_joined(name) {
            return Ok(JoinOutcome::AlreadyJoined);
        }
        if !self.gate.can_use(id, channel) {
            return Err(ChatError::PermissionDenied(name.to_string()));
        }

        user.state.join(name);
        out.mark_dirty(id);
        info!(user = %id, channel = %name, "Joined channel");
        Ok(JoinOutcome::Joined)
    }

    /// Leave a channel.
    ///
    /// Leaving the focused channel refocuses the default channel.
    pub fn leave(&mut self, id: &UserId, name: &str, out: &mut Outbox) -> Result<(), ChatError> {
        let channel = self
            .registry
            .by_name(name)
            .ok_or_else(|| ChatError::ChannelNotFound(name.to_string()))?;
        if channel.always_on {
            return Err(ChatError::AlwaysOnChannel(name.to_string()));
        }
        let user = self
            .users
            .get_mut(id)
            .ok_or_else(|| ChatError::NotConnected(id.clone()))?;
        if !user.state.is_joined(name) {
            return Err(ChatError::NotJoined(name.to_string()));
        }

        let was_focus = user.state.is_focused_on(name);
        user.state.leave(name);
        out.mark_dirty(id);
        info!(user = %id, channel = %name, "Left channel");

        if was_focus {
            match self.ensure_default_focus(id, out) {
                Ok(default) => out.notice(
                    id,
                    &format!("Focused channel: {}", self.channel_label(&default)),
                ),
                Err(e) => error!(user = %id, "Focus repair after leave failed: {}", e),
            }
        }
        Ok(())
    }

    /// Leave the focused channel. Returns its name, or `None` without focus.
    pub fn leave_focused(
        &mut self,
        id: &UserId,
        out: &mut Outbox,
    ) -> Result<Option<String>, ChatError> {
        let user = self
            .users
            .get(id)
            .ok_or_else(|| ChatError::NotConnected(id.clone()))?;
        let Some(name) = user.state.focused_channel().map(str::to_string) else {
            return Ok(None);
        };
        self.leave(id, &name, out)?;
        Ok(Some(name))
    }

    /// System-initiated removal after permission loss.
    ///
    /// Always notifies the user. If the channel was the focus, the default
    /// channel is focused instead. Always-on channels are never removed.
    pub fn auto_leave(&mut self, id: &UserId, name: &str, out: &mut Outbox) {
        if self.registry.by_name(name).is_some_and(|c| c.always_on) {
            warn!(user = %id, channel = %name, "Refusing to auto-leave an always-on channel");
            return;
        }
        let Some(user) = self.users.get_mut(id) else {
            return;
        };
        if !user.state.is_joined(name) {
            return;
        }

        let was_focus = user.state.is_focused_on(name);
        user.state.leave(name);
        out.mark_dirty(id);
        info!(user = %id, channel = %name, "Auto-left channel after permission loss");

        if was_focus {
            if let Err(e) = self.ensure_default_focus(id, out) {
                error!(user = %id, "Focus repair after auto-leave failed: {}", e);
            }
            out.error(
                id,
                &format!(
                    "You were automatically removed from channel '{name}' due to permission loss and it was your focus. Focused to default."
                ),
            );
        } else {
            out.error(
                id,
                &format!("You were automatically removed from channel '{name}' due to permission loss."),
            );
        }
    }

    /// Focus a channel, joining it if needed.
    pub fn focus_channel(
        &mut self,
        id: &UserId,
        name: &str,
        out: &mut Outbox,
    ) -> Result<(), ChatError> {
        self.apply_focus(id, name, out)?;
        debug!(user = %id, channel = %name, "Focused channel");
        Ok(())
    }

    /// Focus direct messages to a connected user.
    pub fn focus_dm(
        &mut self,
        id: &UserId,
        target: &UserId,
        out: &mut Outbox,
    ) -> Result<(), ChatError> {
        if !self.users.contains_key(target) {
            return Err(ChatError::TargetOffline);
        }
        let user = self
            .users
            .get_mut(id)
            .ok_or_else(|| ChatError::NotConnected(id.clone()))?;
        user.state.focus = Some(Focus::Direct(target.clone()));
        out.mark_dirty(id);
        debug!(user = %id, target = %target, "Focused direct messages");
        Ok(())
    }

    /// Replace the registry and reconcile every connected user.
    ///
    /// Returns the number of channels loaded.
    pub fn reload(
        &mut self,
        definitions: Vec<ChannelDefinition>,
        default_name: impl Into<String>,
        out: &mut Outbox,
    ) -> usize {
        self.reload_with_grants(definitions, default_name, None, out)
    }

    /// Replace grants and registry together, then reconcile every user.
    ///
    /// Grants are dropped with a warning when no grant table is attached.
    pub fn reload_with_grants(
        &mut self,
        definitions: Vec<ChannelDefinition>,
        default_name: impl Into<String>,
        grants: Option<GrantTable>,
        out: &mut Outbox,
    ) -> usize {
        if let Some(grants) = grants {
            match &self.grant_table {
                Some(table) => table.apply(&grants),
                None => warn!("Reload carried grants but no grant table is attached"),
            }
        }
        let loaded = self.registry.load(definitions, default_name);
        let ids: Vec<UserId> = self.users.keys().cloned().collect();
        for id in &ids {
            self.reconcile(id, out);
        }
        info!("Channel states re-evaluated for {} users", ids.len());
        loaded
    }

    /// Bring one user's state in line with the registry and permissions.
    pub(crate) fn reconcile(&mut self, id: &UserId, out: &mut Outbox) {
        let (revoked, missing) = {
            let Some(user) = self.users.get_mut(id) else {
                return;
            };

            let stale: Vec<String> = user
                .state
                .joined
                .iter()
                .filter(|n| !self.registry.contains(n))
                .cloned()
                .collect();
            for name in &stale {
                info!(user = %id, channel = %name, "Removing membership of deleted channel");
                user.state.leave(name);
                out.mark_dirty(id);
            }

            let revoked: Vec<String> = user
                .state
                .joined
                .iter()
                .filter_map(|n| self.registry.by_name(n))
                .filter(|c| !self.gate.can_use(id, c))
                .map(|c| c.name.clone())
                .collect();
            let missing: Vec<String> = self
                .registry
                .always_on()
                .filter(|c| !user.state.is_joined(&c.name))
                .map(|c| c.name.clone())
                .collect();
            (revoked, missing)
        };

        for name in &revoked {
            self.auto_leave(id, name, out);
        }

        for name in &missing {
            if let Some(user) = self.users.get_mut(id) {
                user.state.join(name);
                out.mark_dirty(id);
            }
            out.notice(id, &format!("Joined channel: {}", self.channel_label(name)));
        }

        let needs_focus = match self.users.get(id).map(|u| &u.state.focus) {
            None => return,
            Some(None) => true,
            Some(Some(Focus::Channel(name))) => !self
                .users
                .get(id)
                .is_some_and(|u| u.state.is_joined(name)),
            Some(Some(Focus::Direct(target))) => !self.users.contains_key(target),
        };
        if needs_focus {
            if let Some(user) = self.users.get_mut(id) {
                user.state.focus = None;
            }
            match self.ensure_default_focus(id, out) {
                Ok(default) => out.notice(
                    id,
                    &format!("Focused channel: {}", self.channel_label(&default)),
                ),
                Err(e) => error!(user = %id, "Focus repair after reload failed: {}", e),
            }
        }
    }
}

impl std::fmt::Debug for ChatCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCore")
            .field("channels", &self.registry.len())
            .field("users", &self.users.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
