//! Conversation store.
//!
//! Durable state for providers, conversations and their ordered message logs.
//! Two backends implement [`ConversationStore`]: an in-memory map store and a
//! SQLite store. The realtime pipeline only ever sees the trait.

mod error;
mod memory;
mod models;
mod sqlite;

use async_trait::async_trait;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use models::{
    ChatMessage, ChatRole, ChatSession, DEFAULT_CHAT_TITLE, NewChatMessage, NewChatSession,
    NewProvider, Provider, ProviderKind, ProviderUpdate,
};
pub use sqlite::SqliteStore;

/// Storage interface consumed by the chat pipeline and the REST API.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    // ========== Providers ==========

    async fn get_provider(&self, id: i64) -> StoreResult<Option<Provider>>;

    async fn get_provider_by_name(&self, name: &str) -> StoreResult<Option<Provider>>;

    async fn list_providers(&self) -> StoreResult<Vec<Provider>>;

    async fn create_provider(&self, provider: NewProvider) -> StoreResult<Provider>;

    /// Returns `None` when the provider does not exist.
    async fn update_provider(&self, id: i64, update: ProviderUpdate)
    -> StoreResult<Option<Provider>>;

    /// Returns whether a provider was deleted.
    async fn delete_provider(&self, id: i64) -> StoreResult<bool>;

    // ========== Chat Sessions ==========

    async fn get_chat_session(&self, id: i64) -> StoreResult<Option<ChatSession>>;

    /// Sessions owned by `user_id`, newest first.
    async fn list_chat_sessions(&self, user_id: i64) -> StoreResult<Vec<ChatSession>>;

    async fn create_chat_session(&self, session: NewChatSession) -> StoreResult<ChatSession>;

    /// Deletes the session and its messages. Returns whether it existed.
    async fn delete_chat_session(&self, id: i64) -> StoreResult<bool>;

    // ========== Chat Messages ==========

    /// Messages of a session in `(timestamp, id)` order.
    async fn get_chat_messages(&self, session_id: i64) -> StoreResult<Vec<ChatMessage>>;

    /// Appends a message, assigning id and timestamp, and touches the session.
    async fn create_chat_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage>;
}
