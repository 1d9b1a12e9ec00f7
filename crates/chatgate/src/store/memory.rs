//! In-memory conversation store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::error::{StoreError, StoreResult};
use super::models::{
    ChatMessage, ChatSession, NewChatMessage, NewChatSession, NewProvider, Provider,
    ProviderUpdate,
};
use super::ConversationStore;

#[derive(Default)]
struct MemoryState {
    providers: BTreeMap<i64, Provider>,
    sessions: BTreeMap<i64, ChatSession>,
    /// Per-session message log, kept in insertion order.
    messages: BTreeMap<i64, Vec<ChatMessage>>,
    next_provider_id: i64,
    next_session_id: i64,
    next_message_id: i64,
}

impl MemoryState {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_provider(&self, id: i64) -> StoreResult<Option<Provider>> {
        Ok(self.state.read().await.providers.get(&id).cloned())
    }

    async fn get_provider_by_name(&self, name: &str) -> StoreResult<Option<Provider>> {
        let state = self.state.read().await;
        Ok(state.providers.values().find(|p| p.name == name).cloned())
    }

    async fn list_providers(&self) -> StoreResult<Vec<Provider>> {
        Ok(self.state.read().await.providers.values().cloned().collect())
    }

    async fn create_provider(&self, provider: NewProvider) -> StoreResult<Provider> {
        let mut state = self.state.write().await;
        if state.providers.values().any(|p| p.name == provider.name) {
            return Err(StoreError::Conflict(format!(
                "provider '{}' already exists",
                provider.name
            )));
        }

        let id = MemoryState::next_id(&mut state.next_provider_id);
        let created = Provider {
            id,
            name: provider.name,
            kind: provider.kind,
            api_key: provider.api_key,
            active: provider.active,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.providers.insert(id, created.clone());
        Ok(created)
    }

    async fn update_provider(
        &self,
        id: i64,
        update: ProviderUpdate,
    ) -> StoreResult<Option<Provider>> {
        let mut state = self.state.write().await;
        if let Some(ref name) = update.name
            && state.providers.values().any(|p| p.id != id && &p.name == name)
        {
            return Err(StoreError::Conflict(format!("provider '{}' already exists", name)));
        }

        let Some(provider) = state.providers.get_mut(&id) else {
            return Ok(None);
        };
        update.apply(provider);
        Ok(Some(provider.clone()))
    }

    async fn delete_provider(&self, id: i64) -> StoreResult<bool> {
        Ok(self.state.write().await.providers.remove(&id).is_some())
    }

    async fn get_chat_session(&self, id: i64) -> StoreResult<Option<ChatSession>> {
        Ok(self.state.read().await.sessions.get(&id).cloned())
    }

    async fn list_chat_sessions(&self, user_id: i64) -> StoreResult<Vec<ChatSession>> {
        let state = self.state.read().await;
        let mut sessions: Vec<ChatSession> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn create_chat_session(&self, session: NewChatSession) -> StoreResult<ChatSession> {
        let mut state = self.state.write().await;
        let id = MemoryState::next_id(&mut state.next_session_id);
        let created = ChatSession {
            id,
            user_id: session.user_id,
            title: session.title,
            provider_id: session.provider_id,
            model: session.model,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.sessions.insert(id, created.clone());
        Ok(created)
    }

    async fn delete_chat_session(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        state.messages.remove(&id);
        Ok(state.sessions.remove(&id).is_some())
    }

    async fn get_chat_messages(&self, session_id: i64) -> StoreResult<Vec<ChatMessage>> {
        let state = self.state.read().await;
        Ok(state.messages.get(&session_id).cloned().unwrap_or_default())
    }

    async fn create_chat_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage> {
        let mut state = self.state.write().await;
        if !state.sessions.contains_key(&message.session_id) {
            return Err(StoreError::not_found("chat session", message.session_id));
        }

        let id = MemoryState::next_id(&mut state.next_message_id);
        let log = state.messages.entry(message.session_id).or_default();
        // Keep timestamps non-decreasing even if the wall clock steps back.
        let timestamp = monotonic_now(log.last().map(|m| m.timestamp));
        let created = ChatMessage {
            id,
            session_id: message.session_id,
            role: message.role,
            content: message.content,
            tool_name: message.tool_name,
            timestamp,
        };
        log.push(created.clone());

        if let Some(session) = state.sessions.get_mut(&message.session_id) {
            session.updated_at = Some(timestamp);
        }
        Ok(created)
    }
}

fn monotonic_now(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}
