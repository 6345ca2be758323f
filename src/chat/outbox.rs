//! Effects produced by chat operations.
//!
//! Core operations never talk to sessions, the store or the relay directly.
//! They record what should happen in an [`Outbox`], which the chat loop
//! flushes once the operation is complete.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::format;
use super::presence::UserId;

/// Type of delivered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Channel message.
    Chat,
    /// Direct message.
    Direct,
    /// System notice to a single user.
    Notice,
    /// Message relayed in from the bridge.
    Relay,
}

impl MessageType {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Chat => "chat",
            MessageType::Direct => "direct",
            MessageType::Notice => "notice",
            MessageType::Relay => "relay",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rendered line for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Recipient.
    pub recipient: UserId,
    /// Line type.
    pub message_type: MessageType,
    /// Markup text.
    pub line: String,
    /// Timestamp when the line was produced.
    pub timestamp: DateTime<Utc>,
}

impl Delivery {
    /// Create a delivery stamped now.
    pub fn new(recipient: UserId, message_type: MessageType, line: impl Into<String>) -> Self {
        Self {
            recipient,
            message_type,
            line: line.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Pending effects of one or more operations.
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
    dirty: BTreeSet<UserId>,
    relayed: Vec<String>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line.
    pub fn push(&mut self, recipient: &UserId, message_type: MessageType, line: impl Into<String>) {
        self.deliveries
            .push(Delivery::new(recipient.clone(), message_type, line));
    }

    /// Queue a system notice.
    pub fn notice(&mut self, recipient: &UserId, text: &str) {
        self.push(recipient, MessageType::Notice, format::notice(text));
    }

    /// Queue an error notice.
    pub fn error(&mut self, recipient: &UserId, text: &str) {
        self.push(recipient, MessageType::Notice, format::error_notice(text));
    }

    /// Record that a user's persisted state changed.
    pub fn mark_dirty(&mut self, user: &UserId) {
        self.dirty.insert(user.clone());
    }

    /// Queue a line for the outbound relay.
    pub fn relay(&mut self, line: impl Into<String>) {
        self.relayed.push(line.into());
    }

    /// All queued deliveries.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Users whose state must be saved.
    pub fn dirty(&self) -> &BTreeSet<UserId> {
        &self.dirty
    }

    /// Lines queued for the relay.
    pub fn relayed(&self) -> &[String] {
        &self.relayed
    }

    /// Lines queued for one recipient, in order.
    pub fn lines_for(&self, recipient: &UserId) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter(|d| &d.recipient == recipient)
            .map(|d| d.line.as_str())
            .collect()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.dirty.is_empty() && self.relayed.is_empty()
    }

    /// Split into deliveries, dirty users and relay lines.
    pub fn into_parts(self) -> (Vec<Delivery>, BTreeSet<UserId>, Vec<String>) {
        (self.deliveries, self.dirty, self.relayed)
    }
}
