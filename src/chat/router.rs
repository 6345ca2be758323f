//! Prefix routing of raw chat input.
//!
//! Input of the form `prefix:content` is matched against, in order, the DM
//! reply token, the global token and channel shortcuts. Anything else goes to
//! the sender's current focus unchanged.

use tracing::{debug, error};

use super::outbox::Outbox;
use super::presence::UserId;
use super::service::ChatCore;
use super::state::Focus;
use crate::error::ChatError;

/// Where a routed message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to a channel.
    Delivered { channel: String, recipients: usize },
    /// Sent as a direct message.
    DirectSent { target: UserId },
    /// A prefix without content only switched focus.
    FocusChanged,
    /// Blank input.
    Ignored,
}

/// Split `raw` at the first `separator` into prefix and trimmed content.
pub fn split_prefix<'a>(raw: &'a str, separator: &str) -> Option<(&'a str, &'a str)> {
    if separator.is_empty() {
        return None;
    }
    raw.split_once(separator)
        .map(|(prefix, rest)| (prefix, rest.trim()))
}

/// Channel resolved from a prefix.
enum Prefixed {
    Channel(String),
    Direct(UserId),
}

impl ChatCore {
    /// Route one line of chat input from `sender`.
    ///
    /// Failures the sender must know about are reported as notices in `out`;
    /// the returned error is for the caller's logging.
    pub fn handle_chat(
        &mut self,
        sender: &UserId,
        raw: &str,
        out: &mut Outbox,
    ) -> Result<RouteOutcome, ChatError> {
        if raw.trim().is_empty() {
            return Ok(RouteOutcome::Ignored);
        }
        if !self.is_online(sender) {
            return Err(ChatError::NotConnected(sender.clone()));
        }

        let mut content = raw;
        let mut target = None;

        if let Some((prefix, rest)) = split_prefix(raw, &self.settings.prefix_separator) {
            if let Some(resolved) = self.resolve_prefix(sender, prefix, out)? {
                if rest.is_empty() {
                    debug!(user = %sender, prefix, "Prefix without content, focus only");
                    if let Prefixed::Direct(target) = &resolved {
                        self.announce_dm_focus(sender, target, out);
                    }
                    return Ok(RouteOutcome::FocusChanged);
                }
                content = rest;
                target = Some(resolved);
            }
        }

        let target = match target {
            Some(target) => target,
            None => self.current_target(sender, out)?,
        };

        match target {
            Prefixed::Direct(target) => {
                if let Err(e) = self.send_direct(sender, &target, content, out) {
                    out.error(sender, &e.to_string());
                    self.repair_stale_dm_focus(sender, out);
                    return Err(e);
                }
                Ok(RouteOutcome::DirectSent { target })
            }
            Prefixed::Channel(channel) => {
                let recipients = self.send_to_channel(sender, &channel, content, out)?;
                Ok(RouteOutcome::Delivered {
                    channel,
                    recipients,
                })
            }
        }
    }

    /// Act on a routing prefix. `Ok(None)` means the prefix is ordinary text.
    fn resolve_prefix(
        &mut self,
        sender: &UserId,
        prefix: &str,
        out: &mut Outbox,
    ) -> Result<Option<Prefixed>, ChatError> {
        if prefix == self.settings.dm_reply_token {
            let target = match self.reply_target(sender) {
                Ok(target) => target,
                Err(e) => {
                    debug!(user = %sender, "DM reply prefix with no reachable target: {}", e);
                    return Err(e);
                }
            };
            self.focus_dm(sender, &target, out)?;
            return Ok(Some(Prefixed::Direct(target)));
        }

        if prefix == self.settings.global_token {
            let default = match self.registry.resolve_default() {
                Ok(channel) => channel.name.clone(),
                Err(_) => return Err(self.no_default_channel(sender, out)),
            };
            if let Err(e) = self.switch_focus(sender, &default, out) {
                out.error(sender, &e.to_string());
                return Err(e);
            }
            return Ok(Some(Prefixed::Channel(default)));
        }

        let Some(channel) = self.registry.by_shortcut(prefix) else {
            debug!(user = %sender, prefix, "No channel for prefix, sending as text");
            return Ok(None);
        };
        let name = channel.name.clone();
        if !self.gate.can_use(sender, channel) {
            let label = channel.label();
            out.error(
                sender,
                &format!("You don't have permission for channel shortcut '{label}'."),
            );
            return Err(ChatError::PermissionDenied(name));
        }
        self.switch_focus(sender, &name, out)?;
        Ok(Some(Prefixed::Channel(name)))
    }

    /// Target for unprefixed input, repairing a missing focus.
    fn current_target(&mut self, sender: &UserId, out: &mut Outbox) -> Result<Prefixed, ChatError> {
        let focus = self
            .user(sender)
            .and_then(|u| u.state().focus().cloned());
        match focus {
            Some(Focus::Channel(name)) => Ok(Prefixed::Channel(name)),
            Some(Focus::Direct(target)) => Ok(Prefixed::Direct(target)),
            None => match self.ensure_default_focus(sender, out) {
                Ok(default) => {
                    out.notice(
                        sender,
                        &format!(
                            "You were not focused on any channel. Message sent to default: {}",
                            self.channel_label(&default)
                        ),
                    );
                    Ok(Prefixed::Channel(default))
                }
                Err(_) => Err(self.no_default_channel(sender, out)),
            },
        }
    }

    /// Focus a channel, announcing it when the focus changed.
    fn switch_focus(&mut self, sender: &UserId, name: &str, out: &mut Outbox) -> Result<(), ChatError> {
        if self.apply_focus(sender, name, out)? {
            out.notice(
                sender,
                &format!("Focused channel: {}", self.channel_label(name)),
            );
        }
        Ok(())
    }

    fn no_default_channel(&self, sender: &UserId, out: &mut Outbox) -> ChatError {
        error!(user = %sender, "No default channel to focus. Cannot send message.");
        let err = ChatError::NoDefaultChannel;
        out.error(sender, &err.to_string());
        err
    }

    fn repair_stale_dm_focus(&mut self, sender: &UserId, out: &mut Outbox) {
        let stale = matches!(
            self.user(sender).and_then(|u| u.state().focus()),
            Some(Focus::Direct(target)) if !self.is_online(target)
        );
        if stale {
            if let Err(e) = self.ensure_default_focus(sender, out) {
                error!(user = %sender, "Focus repair failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::channel::{ChannelDefinition, ChannelRegistry};
    use crate::chat::permission::{PermissionGate, StaticPermissions};
    use crate::chat::presence::Position;
    use crate::chat::state::StoredChatState;

    fn setup() -> (ChatCore, Arc<StaticPermissions>, UserId) {
        let registry = ChannelRegistry::from_definitions(
            vec![
                ChannelDefinition::new("global", "g", "[G]").always_on(),
                ChannelDefinition::new("trade", "t", "[T]"),
                ChannelDefinition::new("staff", "s", "[S]").with_permission("chat.staff"),
            ],
            "global",
        );
        let perms = Arc::new(StaticPermissions::new());
        let mut core = ChatCore::with_rng(
            registry,
            PermissionGate::new(perms.clone()),
            StdRng::seed_from_u64(11),
        );
        let alice = UserId::new("alice");
        let mut out = Outbox::new();
        core.connect(alice.clone(), "Alice", Position::default(), StoredChatState::default(), &mut out)
            .unwrap();
        (core, perms, alice)
    }

    #[test]
    fn test_split_prefix() {
        assert_eq!(split_prefix("t: hello", ":"), Some(("t", "hello")));
        assert_eq!(split_prefix("a:b:c", ":"), Some(("a", "b:c")));
        assert_eq!(split_prefix("hello", ":"), None);
        assert_eq!(split_prefix("t:", ":"), Some(("t", "")));
        assert_eq!(split_prefix("t:x", ""), None);
    }

    #[test]
    fn test_plain_text_to_focus() {
        let (mut core, _, alice) = setup();
        let mut out = Outbox::new();
        let outcome = core.handle_chat(&alice, "hello", &mut out).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Delivered {
                channel: "global".to_string(),
                recipients: 1
            }
        );
    }

    #[test]
    fn test_shortcut_focuses_and_sends() {
        let (mut core, _, alice) = setup();
        let mut out = Outbox::new();
        let outcome = core.handle_chat(&alice, "t:selling wood", &mut out).unwrap();
        assert!(matches!(outcome, RouteOutcome::Delivered { ref channel, .. } if channel == "trade"));
        assert_eq!(core.focused_channel(&alice), Some("trade"));
        let lines = out.lines_for(&alice);
        assert!(lines[0].contains("Focused channel: [T] trade"));
        assert!(lines[1].ends_with("selling wood"));
    }

    #[test]
    fn test_shortcut_without_content_is_focus_only() {
        let (mut core, _, alice) = setup();
        let mut out = Outbox::new();
        assert_eq!(
            core.handle_chat(&alice, "t:   ", &mut out),
            Ok(RouteOutcome::FocusChanged)
        );
        assert_eq!(core.focused_channel(&alice), Some("trade"));
        assert_eq!(out.lines_for(&alice).len(), 1);
    }

    #[test]
    fn test_shortcut_denied() {
        let (mut core, _, alice) = setup();
        let mut out = Outbox::new();
        let err = core.handle_chat(&alice, "s:secret", &mut out).unwrap_err();
        assert_eq!(err, ChatError::PermissionDenied("staff".to_string()));
        assert_eq!(core.focused_channel(&alice), Some("global"));
        assert_eq!(out.lines_for(&alice).len(), 1);
        assert!(out.lines_for(&alice)[0].contains("You don't have permission for channel shortcut"));
    }

    #[test]
    fn test_unknown_prefix_is_text() {
        let (mut core, _, alice) = setup();
        let mut out = Outbox::new();
        core.handle_chat(&alice, "note: ratio 1:2", &mut out).unwrap();
        assert!(out.lines_for(&alice)[0].ends_with("note: ratio 1:2"));
    }

    #[test]
    fn test_global_token_focuses_default() {
        let (mut core, _, alice) = setup();
        let mut out = Outbox::new();
        core.focus_channel(&alice, "trade", &mut out).unwrap();
        let mut out = Outbox::new();
        core.handle_chat(&alice, "g:back", &mut out).unwrap();
        assert_eq!(core.focused_channel(&alice), Some("global"));
    }

    #[test]
    fn test_dm_token_without_history_is_silent() {
        let (mut core, _, alice) = setup();
        let mut out = Outbox::new();
        let err = core.handle_chat(&alice, "d:hey", &mut out).unwrap_err();
        assert_eq!(err, ChatError::NoRecentDm);
        assert!(out.deliveries().is_empty());
        assert_eq!(core.focused_channel(&alice), Some("global"));
    }

    #[test]
    fn test_dm_token_without_content_announces_focus() {
        let (mut core, _, alice) = setup();
        let bob = UserId::new("bob");
        let mut out = Outbox::new();
        core.connect(bob.clone(), "Bob", Position::default(), StoredChatState::default(), &mut out)
            .unwrap();
        core.send_direct(&bob, &alice, "hi", &mut out).unwrap();

        let mut out = Outbox::new();
        assert_eq!(
            core.handle_chat(&alice, "d:", &mut out),
            Ok(RouteOutcome::FocusChanged)
        );
        assert_eq!(
            core.user(&alice).unwrap().state().focus(),
            Some(&Focus::Direct(bob.clone()))
        );
        let lines = out.lines_for(&alice);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Now messaging Bob. Plain messages go to them."));
        assert!(out.lines_for(&bob).is_empty());
    }

    #[test]
    fn test_unfocused_message_goes_to_default() {
        let (mut core, _, alice) = setup();
        if let Some(user) = core.users.get_mut(&alice) {
            user.state.focus = None;
        }
        let mut out = Outbox::new();
        let outcome = core.handle_chat(&alice, "hi", &mut out).unwrap();
        assert!(matches!(outcome, RouteOutcome::Delivered { ref channel, .. } if channel == "global"));
        assert_eq!(core.focused_channel(&alice), Some("global"));
        let lines = out.lines_for(&alice);
        assert!(lines[0].contains("Message sent to default: [G] global"));
        assert!(lines[1].ends_with("hi"));
    }

    #[test]
    fn test_blank_is_ignored() {
        let (mut core, _, alice) = setup();
        let mut out = Outbox::new();
        assert_eq!(core.handle_chat(&alice, "   ", &mut out), Ok(RouteOutcome::Ignored));
        assert!(out.is_empty());
    }

    #[test]
    fn test_not_connected() {
        let (mut core, _, _) = setup();
        let mut out = Outbox::new();
        let ghost = UserId::new("ghost");
        assert_eq!(
            core.handle_chat(&ghost, "hi", &mut out),
            Err(ChatError::NotConnected(ghost))
        );
    }
}
