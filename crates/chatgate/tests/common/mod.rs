//! Test utilities and common setup.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode, header},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

use chatgate::api::{self, AppState};
use chatgate::auth::AuthConfig;
use chatgate::config::AppConfig;
use chatgate::completion::{
    ChatCompleter, CompletionError, CompletionOptions, CompletionResult, PromptMessage,
    VendorError,
};
use chatgate::server;
use chatgate::store::{
    ConversationStore, MemoryStore, NewChatSession, NewProvider, ProviderKind,
};

/// Completer that answers every prompt the same way.
pub struct ScriptedCompleter {
    reply: Option<String>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedCompleter {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ChatCompleter for ScriptedCompleter {
    async fn generate_completion(
        &self,
        _provider_id: i64,
        _model: &str,
        messages: &[PromptMessage],
        _options: CompletionOptions,
    ) -> CompletionResult<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.reply {
            Some(ref text) => Ok(text.clone()),
            None => Err(CompletionError::failed(
                "scripted",
                VendorError::Decode("scripted failure".to_string()),
            )),
        }
    }
}

/// Application wired to an in-memory store and a scripted completer.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub completer: Arc<ScriptedCompleter>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        api::create_router(self.state.clone())
    }
}

pub fn test_app_with(completer: ScriptedCompleter, auth: AuthConfig) -> TestApp {
    test_app_with_config(
        completer,
        AppConfig {
            auth,
            ..Default::default()
        },
    )
}

pub fn test_app_with_config(completer: ScriptedCompleter, config: AppConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let completer = Arc::new(completer);
    let state = AppState::new(store.clone(), completer.clone(), &config);
    TestApp {
        state,
        store,
        completer,
    }
}

/// Default test app: replies "Hi there", no fallback user.
pub fn test_app() -> TestApp {
    test_app_with(ScriptedCompleter::replying("Hi there"), AuthConfig::default())
}

/// Create a provider and a chat owned by `user_id`. Returns (provider id, chat id).
pub async fn seed_chat(store: &dyn ConversationStore, user_id: i64) -> (i64, i64) {
    let provider = match store.get_provider_by_name("test-openai").await.unwrap() {
        Some(p) => p,
        None => store
            .create_provider(NewProvider {
                name: "test-openai".to_string(),
                kind: ProviderKind::OpenAi,
                api_key: "sk-test".to_string(),
                active: true,
            })
            .await
            .unwrap(),
    };
    let session = store
        .create_chat_session(NewChatSession {
            user_id,
            title: "Test chat".to_string(),
            provider_id: provider.id,
            model: "gpt-4o-mini".to_string(),
        })
        .await
        .unwrap();
    (provider.id, session.id)
}

/// Send one request through the router and decode the JSON body (Null when empty).
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    user: Option<i64>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Serve `state` on an ephemeral local port.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state, std::future::pending()));
    addr
}

/// Requests received by a fake vendor: (authorization-ish header, body).
pub type SeenRequests = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

#[derive(Clone)]
struct FakeVendor {
    seen: SeenRequests,
    reply: String,
    status: StatusCode,
    delay: Option<Duration>,
}

async fn fake_openai(
    State(vendor): State<FakeVendor>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    vendor.seen.lock().unwrap().push((headers, body));
    if let Some(delay) = vendor.delay {
        tokio::time::sleep(delay).await;
    }
    if !vendor.status.is_success() {
        return (vendor.status, Json(json!({"error": {"message": "upstream broke"}})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": vendor.reply},
                "finish_reason": "stop"
            }]
        })),
    )
}

async fn fake_anthropic(
    State(vendor): State<FakeVendor>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    vendor.seen.lock().unwrap().push((headers, body));
    if let Some(delay) = vendor.delay {
        tokio::time::sleep(delay).await;
    }
    if !vendor.status.is_success() {
        return (vendor.status, Json(json!({"type": "error"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": "msg_test",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": vendor.reply}],
            "stop_reason": "end_turn"
        })),
    )
}

/// Options for [`spawn_fake_vendor`].
pub struct FakeVendorOptions {
    pub reply: String,
    pub status: StatusCode,
    pub delay: Option<Duration>,
}

impl Default for FakeVendorOptions {
    fn default() -> Self {
        Self {
            reply: "Hi from fake vendor".to_string(),
            status: StatusCode::OK,
            delay: None,
        }
    }
}

/// Bind a server speaking both vendor APIs. Returns its base URL and the
/// log of requests it received.
pub async fn spawn_fake_vendor(options: FakeVendorOptions) -> (String, SeenRequests) {
    let seen: SeenRequests = Arc::new(Mutex::new(Vec::new()));
    let vendor = FakeVendor {
        seen: seen.clone(),
        reply: options.reply,
        status: options.status,
        delay: options.delay,
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(fake_openai))
        .route("/v1/messages", post(fake_anthropic))
        .with_state(vendor);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}
