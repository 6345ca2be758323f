//! Error types for parley.

use thiserror::Error;

use crate::chat::UserId;

/// Chat routing and membership errors.
///
/// Every variant is recovered at the call boundary; the `Display` text is the
/// reason shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No channel with the given name or shortcut.
    #[error("Channel '{0}' not found.")]
    ChannelNotFound(String),

    /// Always-on channels cannot be left.
    #[error("Cannot leave channel '{0}' as it is marked always-on.")]
    AlwaysOnChannel(String),

    /// The user is not a member of the channel.
    #[error("You are not currently in channel: {0}")]
    NotJoined(String),

    /// The permission oracle refused access to the channel.
    #[error("You do not have permission for channel '{0}'.")]
    PermissionDenied(String),

    /// No default channel could be resolved for this message.
    #[error("Error: No active or default channel. Message not sent.")]
    NoDefaultChannel,

    /// The registry holds no channels at all.
    #[error("No chat channels are currently configured.")]
    NoChannelsConfigured,

    /// A direct-message target is not connected.
    #[error("Cannot send: target player is not online.")]
    TargetOffline,

    /// Reply requested without any incoming direct message.
    #[error("No recent DMs to reply to.")]
    NoRecentDm,

    /// The acting user has no live chat state.
    #[error("User '{0}' is not connected.")]
    NotConnected(UserId),

    /// A second session tried to log in with an online user id.
    #[error("User '{0}' is already connected.")]
    AlreadyConnected(UserId),
}

/// Common error type for parley.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Database error from the state store.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored state could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for user or config input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Chat operation failed.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// The chat loop has stopped and no longer accepts requests.
    #[error("chat service is not running")]
    ChatClosed,
}

impl From<sqlx::Error> for ParleyError {
    fn from(e: sqlx::Error) -> Self {
        ParleyError::Database(e.to_string())
    }
}

/// Result type alias for parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
