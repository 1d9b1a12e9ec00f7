//! Completion provider adapter.
//!
//! Resolves a stored provider record, maps the neutral message history to
//! the vendor's request shape, and returns the assistant's text.
//!
//! ```text
//! MessageProcessor ──► ChatCompleter::generate_completion(provider_id, model, history)
//!                            │
//!                            ├─ store lookup (not found / inactive / no key)
//!                            └─ kind ─┬─ anthropic ─► POST /v1/messages
//!                                     └─ openai    ─► POST /v1/chat/completions
//! ```

mod anthropic;
mod error;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use error::{CompletionError, CompletionResult, VendorError};
pub use openai::OpenAiClient;
pub use types::{CompletionOptions, DEFAULT_TEMPERATURE, PromptMessage};

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::store::{ConversationStore, ProviderKind};

/// Completion adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Upper bound on a single vendor call, in seconds.
    pub timeout_secs: u64,
    pub anthropic_base_url: String,
    pub openai_base_url: String,
    /// `max_tokens` sent to Anthropic when the caller does not set one.
    pub anthropic_default_max_tokens: u32,
    /// Sampling temperature for every conversation.
    pub temperature: f32,
    /// Reply length cap. Unset leaves it to the vendor (or the Anthropic default).
    pub max_tokens: Option<u32>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            anthropic_base_url: anthropic::DEFAULT_BASE_URL.to_string(),
            openai_base_url: openai::DEFAULT_BASE_URL.to_string(),
            anthropic_default_max_tokens: anthropic::DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Sampling options handed to every completion call.
    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Produces the assistant reply for a conversation history.
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    async fn generate_completion(
        &self,
        provider_id: i64,
        model: &str,
        messages: &[PromptMessage],
        options: CompletionOptions,
    ) -> CompletionResult<String>;
}

/// [`ChatCompleter`] backed by stored provider records and vendor HTTP APIs.
pub struct ProviderCompleter {
    store: Arc<dyn ConversationStore>,
    anthropic: AnthropicClient,
    openai: OpenAiClient,
    timeout: Duration,
    anthropic_default_max_tokens: u32,
}

impl ProviderCompleter {
    pub fn new(store: Arc<dyn ConversationStore>, config: &CompletionConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            store,
            anthropic: AnthropicClient::new(client.clone(), config.anthropic_base_url.clone()),
            openai: OpenAiClient::new(client, config.openai_base_url.clone()),
            timeout: config.timeout(),
            anthropic_default_max_tokens: config.anthropic_default_max_tokens,
        })
    }
}

#[async_trait]
impl ChatCompleter for ProviderCompleter {
    async fn generate_completion(
        &self,
        provider_id: i64,
        model: &str,
        messages: &[PromptMessage],
        options: CompletionOptions,
    ) -> CompletionResult<String> {
        let provider = self
            .store
            .get_provider(provider_id)
            .await?
            .ok_or(CompletionError::ProviderNotFound(provider_id))?;

        if !provider.active {
            return Err(CompletionError::ProviderInactive(provider.name));
        }
        if !provider.has_api_key() {
            return Err(CompletionError::ProviderUnconfigured(provider.name));
        }
        let api_key = provider.api_key.as_str();

        debug!(
            "Requesting {} completion from provider {} (model {}, {} messages)",
            provider.kind,
            provider.name,
            model,
            messages.len()
        );

        let call = async {
            match provider.kind {
                ProviderKind::Anthropic => {
                    let request = anthropic::build_request(
                        model,
                        messages,
                        options,
                        self.anthropic_default_max_tokens,
                    );
                    self.anthropic.complete(api_key, &request).await
                }
                ProviderKind::OpenAi => {
                    let request = openai::build_request(model, messages, options);
                    self.openai.complete(api_key, &request).await
                }
            }
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => {
                info!(
                    "Provider {} returned {} chars for model {}",
                    provider.name,
                    text.len(),
                    model
                );
                Ok(text)
            }
            Ok(Err(err)) => {
                warn!("Provider {} failed: {}", provider.name, err);
                Err(CompletionError::failed(provider.name, err))
            }
            Err(_) => {
                warn!(
                    "Provider {} timed out after {:?}",
                    provider.name, self.timeout
                );
                Err(CompletionError::failed(
                    provider.name,
                    VendorError::Timeout(self.timeout),
                ))
            }
        }
    }
}

/// Decode a vendor response, turning non-success statuses into [`VendorError::Api`].
async fn vendor_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, VendorError> {
    let status = response.status();

    if status.is_success() {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VendorError::Decode(format!("Failed to parse response: {}", e)))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(VendorError::Api { status, body })
    }
}
