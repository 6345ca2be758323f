use std::collections::HashMap;
use std::sync::Mutex;

use super::ChatStateStore;
use crate::chat::{StoredChatState, UserId};
use crate::Result;

/// In-process store, used by tests and embedders without a database.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<UserId, StoredChatState>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the stored state for `user`.
    pub fn insert(&self, user: UserId, state: StoredChatState) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user, state);
    }

    /// Current stored state for `user`.
    pub fn get(&self, user: &UserId) -> Option<StoredChatState> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user)
            .cloned()
    }

    /// Number of users with stored state.
    pub fn len(&self) -> usize {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChatStateStore for MemoryStateStore {
    async fn load(&self, user: &UserId) -> Result<Option<StoredChatState>> {
        Ok(self.get(user))
    }

    async fn save(&self, user: &UserId, state: &StoredChatState) -> Result<()> {
        self.insert(user.clone(), state.clone());
        Ok(())
    }
}
