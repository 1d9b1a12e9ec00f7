//! Provider-neutral prompt types.

use crate::store::{ChatMessage, ChatRole};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// One role-tagged message handed to a completion provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool correlation id; only meaningful for `role = tool`.
    pub name: Option<String>,
}

impl PromptMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            name: Some(name.into()),
        }
    }
}

impl From<&ChatMessage> for PromptMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
            name: match msg.role {
                ChatRole::Tool => msg.tool_name.clone(),
                _ => None,
            },
        }
    }
}

/// Sampling options for a completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}
