//! SQLite-backed chat state store.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::ChatStateStore;
use crate::chat::{StoredChatState, UserId};
use crate::{ParleyError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chat_state (
    user_id     TEXT PRIMARY KEY,
    joined      TEXT NOT NULL,           -- JSON array of channel names
    focus       TEXT,
    updated_at  TEXT NOT NULL
)
"#;

/// Database row type for stored chat state.
#[derive(sqlx::FromRow)]
struct ChatStateRow {
    joined: String,
    focus: Option<String>,
}

impl TryFrom<ChatStateRow> for StoredChatState {
    type Error = ParleyError;

    fn try_from(row: ChatStateRow) -> Result<Self> {
        let joined: BTreeSet<String> = serde_json::from_str(&row.joined)?;
        Ok(Self {
            joined,
            focus: row.focus,
        })
    }
}

/// Chat state store over a `sqlx` SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open the database at `path`, creating it and its parent directories
    /// if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening chat state database at {:?}", path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory chat state database");
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection, otherwise each would see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of users with stored state.
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_state")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl ChatStateStore for SqliteStateStore {
    async fn load(&self, user: &UserId) -> Result<Option<StoredChatState>> {
        let row = sqlx::query_as::<_, ChatStateRow>(
            "SELECT joined, focus FROM chat_state WHERE user_id = $1",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredChatState::try_from).transpose()
    }

    async fn save(&self, user: &UserId, state: &StoredChatState) -> Result<()> {
        let joined = serde_json::to_string(&state.joined)?;
        sqlx::query(
            r#"
            INSERT INTO chat_state (user_id, joined, focus, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(user_id) DO UPDATE SET
                joined = excluded.joined,
                focus = excluded.focus,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user.as_str())
        .bind(joined)
        .bind(state.focus.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(user = %user, "Saved chat state");
        Ok(())
    }
}
