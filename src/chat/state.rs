//! Per-user chat state.
//!
//! [`UserChatState`] lives only while the user is connected. The persisted
//! subset is [`StoredChatState`]: the joined set and a channel focus.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::presence::UserId;

/// Where plain messages from a user are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Focus {
    /// A joined channel, by name.
    Channel(String),
    /// Direct messages to a connected user.
    Direct(UserId),
}

/// Live membership and focus of one connected user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChatState {
    pub(crate) joined: BTreeSet<String>,
    pub(crate) focus: Option<Focus>,
    pub(crate) last_incoming_dm_sender: Option<UserId>,
}

impl UserChatState {
    /// Joined channel names.
    pub fn joined(&self) -> &BTreeSet<String> {
        &self.joined
    }

    /// Whether the user is a member of `channel`.
    pub fn is_joined(&self, channel: &str) -> bool {
        self.joined.contains(channel)
    }

    /// Current focus.
    pub fn focus(&self) -> Option<&Focus> {
        self.focus.as_ref()
    }

    /// Focused channel name, if the focus is a channel.
    pub fn focused_channel(&self) -> Option<&str> {
        match &self.focus {
            Some(Focus::Channel(name)) => Some(name),
            _ => None,
        }
    }

    /// Whether the focus is `channel`.
    pub fn is_focused_on(&self, channel: &str) -> bool {
        self.focused_channel() == Some(channel)
    }

    /// Sender of the most recent incoming direct message.
    pub fn last_incoming_dm_sender(&self) -> Option<&UserId> {
        self.last_incoming_dm_sender.as_ref()
    }

    /// Add a channel. Returns false if it was already joined.
    pub(crate) fn join(&mut self, channel: &str) -> bool {
        self.joined.insert(channel.to_string())
    }

    /// Remove a channel. Returns false if it was not joined.
    ///
    /// A channel focus on the removed channel is cleared.
    pub(crate) fn leave(&mut self, channel: &str) -> bool {
        let removed = self.joined.remove(channel);
        if removed && self.is_focused_on(channel) {
            self.focus = None;
        }
        removed
    }

    /// Focus a joined channel.
    pub(crate) fn focus_channel(&mut self, channel: &str) {
        self.joined.insert(channel.to_string());
        self.focus = Some(Focus::Channel(channel.to_string()));
    }

    /// Channel focus implies membership.
    pub fn is_consistent(&self) -> bool {
        match &self.focus {
            Some(Focus::Channel(name)) => self.joined.contains(name),
            _ => true,
        }
    }

    /// Persistable subset. Direct focus is not stored.
    pub fn to_stored(&self) -> StoredChatState {
        StoredChatState {
            joined: self.joined.clone(),
            focus: self.focused_channel().map(str::to_string),
        }
    }
}

/// Persisted chat state for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChatState {
    /// Joined channel names.
    pub joined: BTreeSet<String>,
    /// Focused channel name.
    pub focus: Option<String>,
}

impl StoredChatState {
    /// Create a stored state.
    pub fn new<I, S>(joined: I, focus: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            joined: joined.into_iter().map(Into::into).collect(),
            focus: focus.map(str::to_string),
        }
    }
}
