//! Conversation store data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use chatgate_protocol::{ChatMessage, ChatRole};

/// Default title for conversations created without one.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

// ========== Providers ==========

/// Vendor family a provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Chat Completions API.
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            _ => Err(format!("Unsupported AI provider: {}", s)),
        }
    }
}

/// A configured AI vendor account.
#[derive(Clone)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub kind: ProviderKind,
    /// Secret; never serialized or logged.
    pub api_key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Provider {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_key", &"<redacted>")
            .field("active", &self.active)
            .finish()
    }
}

/// Input for creating a provider.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProvider {
    pub name: String,
    pub kind: ProviderKind,
    pub api_key: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Partial provider update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUpdate {
    pub name: Option<String>,
    pub api_key: Option<String>,
    pub active: Option<bool>,
}

impl ProviderUpdate {
    pub(crate) fn apply(self, provider: &mut Provider) {
        if let Some(name) = self.name {
            provider.name = name;
        }
        if let Some(api_key) = self.api_key {
            provider.api_key = api_key;
        }
        if let Some(active) = self.active {
            provider.active = active;
        }
        provider.updated_at = Some(Utc::now());
    }
}

fn default_true() -> bool {
    true
}

// ========== Chat Sessions ==========

/// A conversation tied to one provider and model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub provider_id: i64,
    pub model: String,
    pub created_at: DateTime<Utc>,
    /// Touched whenever a message is appended.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating a conversation.
#[derive(Debug, Clone)]
pub struct NewChatSession {
    pub user_id: i64,
    pub title: String,
    pub provider_id: i64,
    pub model: String,
}

// ========== Chat Messages ==========

/// Input for appending a message to a conversation.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: i64,
    pub role: ChatRole,
    pub content: String,
    pub tool_name: Option<String>,
}

impl NewChatMessage {
    pub fn user(session_id: i64, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: ChatRole::User,
            content: content.into(),
            tool_name: None,
        }
    }

    pub fn assistant(session_id: i64, content: impl Into<String>) -> Self {
        Self {
            session_id,
            role: ChatRole::Assistant,
            content: content.into(),
            tool_name: None,
        }
    }
}
