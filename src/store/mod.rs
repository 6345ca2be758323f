//! Persistence of per-user chat state.
//!
//! Only joined channels and the focused channel survive a session. The chat
//! loop loads a user's state on connect and saves it whenever an operation
//! marks the user dirty.

mod memory;
mod sqlite;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

use std::future::Future;

use crate::chat::{StoredChatState, UserId};
use crate::Result;

/// Storage backend for [`StoredChatState`].
pub trait ChatStateStore: Send + Sync + 'static {
    /// Load the stored state for `user`, if any.
    fn load(&self, user: &UserId) -> impl Future<Output = Result<Option<StoredChatState>>> + Send;

    /// Insert or replace the stored state for `user`.
    fn save(
        &self,
        user: &UserId,
        state: &StoredChatState,
    ) -> impl Future<Output = Result<()>> + Send;
}
