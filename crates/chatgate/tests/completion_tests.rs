//! Completion adapter tests against a local fake vendor.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

mod common;
use common::{FakeVendorOptions, spawn_fake_vendor};

use chatgate::completion::{
    ChatCompleter, CompletionConfig, CompletionError, CompletionOptions, PromptMessage,
    ProviderCompleter, VendorError,
};
use chatgate::store::{ChatRole, ConversationStore, MemoryStore, NewProvider, ProviderKind};

async fn completer_for(
    kind: ProviderKind,
    base_url: &str,
    timeout_secs: u64,
) -> (ProviderCompleter, i64) {
    let store = Arc::new(MemoryStore::new());
    let provider = store
        .create_provider(NewProvider {
            name: format!("{}-test", kind),
            kind,
            api_key: "sk-vendor".to_string(),
            active: true,
        })
        .await
        .unwrap();

    let config = CompletionConfig {
        timeout_secs,
        anthropic_base_url: base_url.to_string(),
        openai_base_url: base_url.to_string(),
        ..Default::default()
    };
    let completer = ProviderCompleter::new(store, &config).unwrap();
    (completer, provider.id)
}

fn history() -> Vec<PromptMessage> {
    vec![
        PromptMessage::new(ChatRole::System, "Be brief."),
        PromptMessage::new(ChatRole::User, "Hello"),
        PromptMessage::new(ChatRole::Assistant, "Hi!"),
        PromptMessage::new(ChatRole::User, "How are you?"),
    ]
}

#[tokio::test]
async fn test_openai_request_shape() {
    let (base, seen) = spawn_fake_vendor(FakeVendorOptions::default()).await;
    let (completer, provider_id) = completer_for(ProviderKind::OpenAi, &base, 10).await;

    let reply = completer
        .generate_completion(provider_id, "gpt-4o", &history(), CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, "Hi from fake vendor");

    let seen = seen.lock().unwrap();
    let (headers, body) = &seen[0];
    assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-vendor");
    assert_eq!(body["model"], "gpt-4o");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[3]["content"], "How are you?");
    let temperature = body["temperature"].as_f64().unwrap();
    assert!((temperature - 0.7).abs() < 1e-6);
    assert!(body.get("max_tokens").is_none());
}

#[tokio::test]
async fn test_anthropic_request_shape() {
    let (base, seen) = spawn_fake_vendor(FakeVendorOptions {
        reply: "Doing well".to_string(),
        ..Default::default()
    })
    .await;
    let (completer, provider_id) = completer_for(ProviderKind::Anthropic, &base, 10).await;

    let reply = completer
        .generate_completion(
            provider_id,
            "claude-3-5-sonnet",
            &history(),
            CompletionOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(reply, "Doing well");

    let seen = seen.lock().unwrap();
    let (headers, body) = &seen[0];
    assert_eq!(headers.get("x-api-key").unwrap(), "sk-vendor");
    assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
    assert_eq!(body["system"], "Be brief.");
    assert_eq!(body["max_tokens"], 1000);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn test_vendor_error_status() {
    let (base, _) = spawn_fake_vendor(FakeVendorOptions {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        ..Default::default()
    })
    .await;
    let (completer, provider_id) = completer_for(ProviderKind::OpenAi, &base, 10).await;

    let err = completer
        .generate_completion(provider_id, "gpt-4o", &history(), CompletionOptions::default())
        .await
        .unwrap_err();
    match err {
        CompletionError::Failed {
            source: VendorError::Api { status, body },
            ..
        } => {
            assert_eq!(status.as_u16(), 500);
            assert!(body.contains("upstream broke"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_vendor_times_out() {
    let (base, _) = spawn_fake_vendor(FakeVendorOptions {
        delay: Some(Duration::from_secs(3)),
        ..Default::default()
    })
    .await;
    let (completer, provider_id) = completer_for(ProviderKind::Anthropic, &base, 1).await;

    let err = completer
        .generate_completion(
            provider_id,
            "claude-3-5-sonnet",
            &history(),
            CompletionOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompletionError::Failed {
            source: VendorError::Timeout(_),
            ..
        }
    ));
}
