//! Chat module for parley.
//!
//! This module provides the multi-channel chat core:
//! - Per-user channel membership, focus and direct-message state
//! - Prefix routing (`t: hello`, `g: hi`, `d: reply`)
//! - Range-limited and proximity-obscured local channels
//! - Permission gates with automatic removal on revocation
//! - Chat commands (/channels, /focus, /join, /leave, /msg, /r, /who)
//! - A serialized chat loop driven through [`ChatHandle`]

mod command;
mod delivery;
mod direct;
mod format;
mod handle;
mod local;
pub mod markup;
mod outbox;
mod permission;
mod presence;
mod relay;
mod router;
mod service;
mod state;

pub use command::{
    execute, format_channel_list, format_help, format_who, get_command_help, handle_line,
    parse_input, ChatCommand, ChatInput, CommandInfo, CommandOutcome,
};
pub use delivery::{fan_out, FanOut};
pub use format::{
    format_channel_message, format_dm_received, format_dm_sent, format_relay_inbound,
    format_relay_outbound, FormattedMessageDetails, Reach,
};
pub use handle::{run_chat_loop, ChatHandle, ChatRequest, DEFAULT_QUEUE_CAPACITY};
pub use local::{obscure_probability, Speech, FADE_MULTIPLIER};
pub use outbox::{Delivery, MessageType, Outbox};
pub use permission::{
    GrantTable, PermissionGate, PermissionOracle, StaticPermissions, DEFAULT_FALLBACK_LEVEL,
};
pub use presence::{OnlineUser, Position, UserId};
pub use relay::{ChannelRelay, LogRelay, RelaySink};
pub use router::{split_prefix, RouteOutcome};
pub use service::{
    ChatCore, ChatSettings, JoinOutcome, DEFAULT_DM_REPLY_TOKEN, DEFAULT_GLOBAL_TOKEN,
    DEFAULT_PREFIX_SEPARATOR, DEFAULT_RELAY_MAX_LENGTH,
};
pub use state::{Focus, StoredChatState, UserChatState};
