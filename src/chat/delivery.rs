//! Channel message fan-out.

use std::collections::BTreeMap;

use rand::Rng;
use tracing::{debug, info};

use super::format::{self, FormattedMessageDetails};
use super::outbox::{MessageType, Outbox};
use super::permission::PermissionGate;
use super::presence::{OnlineUser, UserId};
use super::service::ChatCore;
use crate::channel::ChannelDefinition;
use crate::error::ChatError;

/// Result of one fan-out pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Number of recipients that received a line, sender included.
    pub delivered: usize,
    /// Members found without permission. They are removed after the pass.
    pub revoked: Vec<UserId>,
}

/// Deliver a formatted message to every eligible member of `channel`.
///
/// Membership is only read here; members who lost permission are collected
/// for cleanup once the pass is complete.
pub fn fan_out<R: Rng + ?Sized>(
    users: &BTreeMap<UserId, OnlineUser>,
    gate: &PermissionGate,
    channel: &ChannelDefinition,
    sender: &UserId,
    details: &FormattedMessageDetails,
    rng: &mut R,
    out: &mut Outbox,
) -> FanOut {
    let mut result = FanOut::default();
    let Some(origin) = users.get(sender).map(|u| u.position) else {
        return result;
    };

    for (id, user) in users {
        if !user.state.is_joined(&channel.name) {
            continue;
        }
        if !gate.can_use(id, channel) {
            result.revoked.push(id.clone());
            continue;
        }

        let line = if id == sender {
            Some(details.full_line())
        } else {
            details.line_for_distance(origin.distance_to(&user.position), rng)
        };
        if let Some(line) = line {
            out.push(id, MessageType::Chat, line);
            result.delivered += 1;
        }
    }
    result
}

impl ChatCore {
    /// Send a message to a channel on behalf of `sender`.
    ///
    /// A sender without permission is removed from the channel and the
    /// message is dropped. Returns the number of recipients.
    pub fn send_to_channel(
        &mut self,
        sender: &UserId,
        channel_name: &str,
        message: &str,
        out: &mut Outbox,
    ) -> Result<usize, ChatError> {
        let channel = self
            .registry
            .by_name(channel_name)
            .cloned()
            .ok_or_else(|| ChatError::ChannelNotFound(channel_name.to_string()))?;
        let sender_name = self
            .users
            .get(sender)
            .map(|u| u.name.clone())
            .ok_or_else(|| ChatError::NotConnected(sender.clone()))?;

        if !self.gate.can_use(sender, &channel) {
            info!(
                user = %sender,
                channel = %channel.name,
                "Sender lost permission for target channel, auto-leaving"
            );
            self.auto_leave(sender, &channel.name, out);
            out.error(
                sender,
                &format!(
                    "You no longer have permission to send messages in '{}'. Message not sent.",
                    channel.label()
                ),
            );
            return Err(ChatError::PermissionDenied(channel.name));
        }

        let details = format::format_channel_message(&channel, &sender_name, message);
        let result = fan_out(
            &self.users,
            &self.gate,
            &channel,
            sender,
            &details,
            &mut self.rng,
            out,
        );

        for id in &result.revoked {
            info!(user = %id, channel = %channel.name, "Recipient lost permission, auto-leaving");
            self.auto_leave(id, &channel.name, out);
        }

        if self.settings.relay_channel.as_deref() == Some(channel.name.as_str()) {
            out.relay(format::format_relay_outbound(&sender_name, message));
        }

        debug!(
            user = %sender,
            channel = %channel.name,
            range = details.effective_range,
            delivered = result.delivered,
            "Channel message sent"
        );
        Ok(result.delivered)
    }

    /// Deliver a message arriving from the relay bridge to every connected
    /// user.
    pub fn external_message(&mut self, author: &str, content: &str, out: &mut Outbox) -> usize {
        let line = format::format_relay_inbound(
            &self.settings.relay_prefix,
            author,
            &self.settings.relay_separator,
            content,
            self.settings.relay_max_length,
        );
        for id in self.users.keys() {
            out.push(id, MessageType::Relay, line.clone());
        }
        debug!(author, recipients = self.users.len(), "Relay message delivered");
        self.users.len()
    }
}
