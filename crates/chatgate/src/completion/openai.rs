//! OpenAI Chat Completions client.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::VendorError;
use super::types::{CompletionOptions, PromptMessage};
use super::vendor_response;
use crate::store::ChatRole;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Map a neutral history onto Chat Completions. Every role is kept in place;
/// tool messages carry their name as `tool_call_id`.
pub fn build_request(
    model: &str,
    messages: &[PromptMessage],
    options: CompletionOptions,
) -> ChatCompletionRequest {
    let messages = messages
        .iter()
        .map(|msg| WireMessage {
            role: msg.role.as_str(),
            content: msg.content.clone(),
            tool_call_id: match msg.role {
                ChatRole::Tool => Some(msg.name.clone().unwrap_or_else(|| "unknown".to_string())),
                _ => None,
            },
        })
        .collect();

    ChatCompletionRequest {
        model: model.to_string(),
        messages,
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    }
}

fn first_choice_text(response: ChatCompletionResponse) -> String {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default()
}

/// HTTP client for one OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send a request and return the first choice's text, or `""`.
    pub async fn complete(
        &self,
        api_key: &str,
        request: &ChatCompletionRequest,
    ) -> Result<String, VendorError> {
        let url = format!("{}{}", self.base_url, COMPLETIONS_PATH);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let body: ChatCompletionResponse = vendor_response(response).await?;
        Ok(first_choice_text(body))
    }
}
