//! parley - multi-channel chat routing.
//!
//! Users join named channels, focus one of them and route single messages
//! with short prefixes. Channels can be permission gated, range limited or
//! proximity obscured. A serialized chat loop owns all state and a small TCP
//! front end exposes it to line-oriented clients.

pub mod channel;
pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod screen;
pub mod server;
pub mod store;

pub use channel::{ChannelDefinition, ChannelRegistry};
pub use chat::{
    ChatCore, ChatHandle, ChatSettings, CommandOutcome, Delivery, GrantTable, Outbox,
    PermissionGate, Position, StaticPermissions, StoredChatState, UserId,
};
pub use config::Config;
pub use error::{ChatError, ParleyError, Result};
pub use server::{ChatServer, ChatSession, SessionOptions};
pub use store::{ChatStateStore, MemoryStateStore, SqliteStateStore};
