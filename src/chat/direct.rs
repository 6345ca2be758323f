//! Direct messages between connected users.

use tracing::debug;

use super::format;
use super::outbox::{MessageType, Outbox};
use super::presence::UserId;
use super::service::ChatCore;
use crate::error::ChatError;

impl ChatCore {
    /// Send a direct message.
    ///
    /// Records the sender as the target's last incoming DM sender. Nothing is
    /// sent or recorded if the target is offline.
    pub fn send_direct(
        &mut self,
        sender: &UserId,
        target: &UserId,
        message: &str,
        out: &mut Outbox,
    ) -> Result<(), ChatError> {
        let sender_name = self
            .users
            .get(sender)
            .map(|u| u.name.clone())
            .ok_or_else(|| ChatError::NotConnected(sender.clone()))?;
        let target_user = self.users.get_mut(target).ok_or(ChatError::TargetOffline)?;

        target_user.state.last_incoming_dm_sender = Some(sender.clone());
        let target_name = target_user.name.clone();

        out.push(
            sender,
            MessageType::Direct,
            format::format_dm_sent(&target_name, message),
        );
        out.push(
            target,
            MessageType::Direct,
            format::format_dm_received(&sender_name, message),
        );
        debug!(from = %sender, to = %target, "Direct message sent");
        Ok(())
    }

    /// Resolve who a reply from `sender` goes to.
    pub fn reply_target(&self, sender: &UserId) -> Result<UserId, ChatError> {
        let user = self
            .users
            .get(sender)
            .ok_or_else(|| ChatError::NotConnected(sender.clone()))?;
        let last = user
            .state
            .last_incoming_dm_sender
            .clone()
            .ok_or(ChatError::NoRecentDm)?;
        if !self.users.contains_key(&last) {
            return Err(ChatError::TargetOffline);
        }
        Ok(last)
    }

    /// Tell `user` that plain messages now go to `target`.
    pub(crate) fn announce_dm_focus(&self, user: &UserId, target: &UserId, out: &mut Outbox) {
        let name = self
            .users
            .get(target)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| target.to_string());
        out.notice(
            user,
            &format!("Now messaging {name}. Plain messages go to them."),
        );
    }

    /// Focus and message the last incoming DM sender.
    pub fn reply_to_last(
        &mut self,
        sender: &UserId,
        message: &str,
        out: &mut Outbox,
    ) -> Result<UserId, ChatError> {
        let target = self.reply_target(sender)?;
        self.focus_dm(sender, &target, out)?;
        self.send_direct(sender, &target, message, out)?;
        Ok(target)
    }

    /// Focus direct messages to `target` and optionally send a message.
    pub fn message_user(
        &mut self,
        sender: &UserId,
        target: &UserId,
        message: Option<&str>,
        out: &mut Outbox,
    ) -> Result<(), ChatError> {
        self.focus_dm(sender, target, out)?;
        match message {
            Some(message) if !message.is_empty() => self.send_direct(sender, target, message, out),
            _ => Ok(()),
        }
    }
}
