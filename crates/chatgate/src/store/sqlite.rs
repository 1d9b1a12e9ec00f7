//! SQLite-backed conversation store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::error::{StoreError, StoreResult};
use super::models::{
    ChatMessage, ChatRole, ChatSession, NewChatMessage, NewChatSession, NewProvider, Provider,
    ProviderKind, ProviderUpdate,
};
use super::ConversationStore;

/// Schema for the conversation database. Timestamps are unix milliseconds.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS providers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('anthropic', 'openai')),
    api_key TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER
);

CREATE TABLE IF NOT EXISTS chat_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    title TEXT NOT NULL DEFAULT 'New Chat',
    provider_id INTEGER NOT NULL,
    model TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id, created_at);

CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    role TEXT NOT NULL CHECK(role IN ('user', 'assistant', 'system', 'tool')),
    content TEXT NOT NULL,
    tool_name TEXT,
    timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_messages_order ON chat_messages(session_id, timestamp, id);
"#;

const PROVIDER_COLUMNS: &str = "id, name, kind, api_key, active, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, title, provider_id, model, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, tool_name, timestamp";

#[derive(FromRow)]
struct ProviderRow {
    id: i64,
    name: String,
    kind: String,
    api_key: String,
    active: bool,
    created_at: i64,
    updated_at: Option<i64>,
}

impl TryFrom<ProviderRow> for Provider {
    type Error = StoreError;

    fn try_from(row: ProviderRow) -> Result<Self, Self::Error> {
        Ok(Provider {
            id: row.id,
            name: row.name,
            kind: ProviderKind::from_str(&row.kind).map_err(StoreError::InvalidData)?,
            api_key: row.api_key,
            active: row.active,
            created_at: from_millis(row.created_at)?,
            updated_at: row.updated_at.map(from_millis).transpose()?,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    title: String,
    provider_id: i64,
    model: String,
    created_at: i64,
    updated_at: Option<i64>,
}

impl TryFrom<SessionRow> for ChatSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(ChatSession {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            provider_id: row.provider_id,
            model: row.model,
            created_at: from_millis(row.created_at)?,
            updated_at: row.updated_at.map(from_millis).transpose()?,
        })
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: i64,
    session_id: i64,
    role: String,
    content: String,
    tool_name: Option<String>,
    timestamp: i64,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            id: row.id,
            session_id: row.session_id,
            role: ChatRole::from_str(&row.role).map_err(StoreError::InvalidData)?,
            content: row.content,
            tool_name: row.tool_name,
            timestamp: from_millis(row.timestamp)?,
        })
    }
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp out of range: {}", ms)))
}

fn map_unique(err: sqlx::Error, what: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(ref db) = err
        && db.is_unique_violation()
    {
        return StoreError::Conflict(what());
    }
    StoreError::Database(err)
}

/// Conversation store persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    ///
    /// Creates the database file and parent directories if they don't exist.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory: {}", parent.display()))?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&database_url)
            .context("parsing database URL")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to database: {}", path.display()))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub async fn in_memory() -> anyhow::Result<Self> {
        use anyhow::Context;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("parsing in-memory database URL")?;

        // A single connection that never recycles; closing it drops the data.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("connecting to in-memory database")?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        use anyhow::Context;

        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("initializing conversation database schema")?;
        Ok(())
    }

}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn get_provider(&self, id: i64) -> StoreResult<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Provider::try_from).transpose()
    }

    async fn get_provider_by_name(&self, name: &str) -> StoreResult<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Provider::try_from).transpose()
    }

    async fn list_providers(&self) -> StoreResult<Vec<Provider>> {
        sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Provider::try_from)
        .collect()
    }

    async fn create_provider(&self, provider: NewProvider) -> StoreResult<Provider> {
        let name = provider.name.clone();
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            r#"
            INSERT INTO providers (name, kind, api_key, active, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {PROVIDER_COLUMNS}
            "#
        ))
        .bind(&provider.name)
        .bind(provider.kind.as_str())
        .bind(&provider.api_key)
        .bind(provider.active)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, || format!("provider '{}' already exists", name)))?;
        Provider::try_from(row)
    }

    async fn update_provider(
        &self,
        id: i64,
        update: ProviderUpdate,
    ) -> StoreResult<Option<Provider>> {
        let Some(mut provider) = self.get_provider(id).await? else {
            return Ok(None);
        };
        update.apply(&mut provider);

        let name = provider.name.clone();
        sqlx::query(
            "UPDATE providers SET name = ?, api_key = ?, active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&provider.name)
        .bind(&provider.api_key)
        .bind(provider.active)
        .bind(provider.updated_at.map(|t| t.timestamp_millis()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, || format!("provider '{}' already exists", name)))?;

        self.get_provider(id).await
    }

    async fn delete_provider(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM providers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_chat_session(&self, id: i64) -> StoreResult<Option<ChatSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ChatSession::try_from).transpose()
    }

    async fn list_chat_sessions(&self, user_id: i64) -> StoreResult<Vec<ChatSession>> {
        sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ChatSession::try_from)
        .collect()
    }

    async fn create_chat_session(&self, session: NewChatSession) -> StoreResult<ChatSession> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO chat_sessions (user_id, title, provider_id, model, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.user_id)
        .bind(&session.title)
        .bind(session.provider_id)
        .bind(&session.model)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        ChatSession::try_from(row)
    }

    async fn delete_chat_session(&self, id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_chat_messages(&self, session_id: i64) -> StoreResult<Vec<ChatMessage>> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE session_id = ? ORDER BY timestamp ASC, id ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ChatMessage::try_from)
        .collect()
    }

    async fn create_chat_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage> {
        let mut tx = self.pool.begin().await?;

        // The insert is the first statement so the transaction takes the write
        // lock up front; a read first would fail with SQLITE_BUSY on upgrade.
        // The timestamp is clamped to the latest stored one so the log order
        // never regresses.
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO chat_messages (session_id, role, content, tool_name, timestamp)
            SELECT ?, ?, ?, ?, MAX(?, COALESCE(
                (SELECT MAX(timestamp) FROM chat_messages WHERE session_id = ?), 0))
            WHERE EXISTS (SELECT 1 FROM chat_sessions WHERE id = ?)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.tool_name)
        .bind(Utc::now().timestamp_millis())
        .bind(message.session_id)
        .bind(message.session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("chat session", message.session_id))?;

        sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
            .bind(row.timestamp)
            .bind(message.session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        ChatMessage::try_from(row)
    }
}
