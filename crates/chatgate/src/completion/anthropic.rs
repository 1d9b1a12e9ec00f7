//! Anthropic Messages API client.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::VendorError;
use super::types::{CompletionOptions, PromptMessage};
use super::vendor_response;
use crate::store::ChatRole;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory for this vendor.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Request body for `POST /v1/messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Turn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One conversational turn. Only `user` and `assistant` are accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Map a neutral history onto the Messages API.
///
/// System messages are concatenated in order into the `system` parameter.
/// Tool messages are dropped. Adjacent turns of the same role are merged so
/// the remaining turns alternate.
pub fn build_request(
    model: &str,
    messages: &[PromptMessage],
    options: CompletionOptions,
    default_max_tokens: u32,
) -> MessagesRequest {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut turns: Vec<Turn> = Vec::new();

    for msg in messages {
        let role = match msg.role {
            ChatRole::System => {
                system_parts.push(&msg.content);
                continue;
            }
            ChatRole::Tool => continue,
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };

        match turns.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            _ => turns.push(Turn {
                role,
                content: msg.content.clone(),
            }),
        }
    }

    MessagesRequest {
        model: model.to_string(),
        system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
        messages: turns,
        temperature: options.temperature,
        max_tokens: options.max_tokens.unwrap_or(default_max_tokens),
    }
}

fn first_text(response: MessagesResponse) -> String {
    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .unwrap_or_default()
}

/// HTTP client for one Anthropic-compatible endpoint.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send a request and return the first text block, or `""`.
    pub async fn complete(
        &self,
        api_key: &str,
        request: &MessagesRequest,
    ) -> Result<String, VendorError> {
        let url = format!("{}{}", self.base_url, MESSAGES_PATH);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await?;

        let body: MessagesResponse = vendor_response(response).await?;
        Ok(first_text(body))
    }
}
