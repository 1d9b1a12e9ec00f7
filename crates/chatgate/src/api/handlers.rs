//! API request handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::CurrentUser;
use crate::store::{
    ChatMessage, ChatSession, DEFAULT_CHAT_TITLE, NewChatSession, NewProvider, Provider,
    ProviderKind, ProviderUpdate,
};
use crate::ws::RegistryStats;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Realtime registry counters.
pub async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.registry.stats())
}

// ========== Providers ==========

/// Provider as exposed over HTTP. The key itself never leaves the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub id: i64,
    pub name: String,
    pub kind: ProviderKind,
    pub active: bool,
    pub has_api_key: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Provider> for ProviderView {
    fn from(p: Provider) -> Self {
        Self {
            has_api_key: p.has_api_key(),
            id: p.id,
            name: p.name,
            kind: p.kind,
            active: p.active,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub async fn list_providers(State(state): State<AppState>) -> ApiResult<Json<Vec<ProviderView>>> {
    let providers = state.store.list_providers().await?;
    Ok(Json(providers.into_iter().map(ProviderView::from).collect()))
}

#[instrument(skip(state, request))]
pub async fn create_provider(
    State(state): State<AppState>,
    Json(request): Json<NewProvider>,
) -> ApiResult<(StatusCode, Json<ProviderView>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("Provider name is required"));
    }

    let provider = state.store.create_provider(request).await?;
    info!(provider_id = provider.id, kind = %provider.kind, "Created provider");
    Ok((StatusCode::CREATED, Json(provider.into())))
}

#[instrument(skip(state, update))]
pub async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ProviderUpdate>,
) -> ApiResult<Json<ProviderView>> {
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("Provider name cannot be empty"));
    }

    let provider = state
        .store
        .update_provider(id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("Provider not found"))?;
    info!(provider_id = id, "Updated provider");
    Ok(Json(provider.into()))
}

#[instrument(skip(state))]
pub async fn delete_provider(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_provider(id).await? {
        return Err(ApiError::not_found("Provider not found"));
    }
    info!(provider_id = id, "Deleted provider");
    Ok(StatusCode::NO_CONTENT)
}

// ========== Chats ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub provider_id: i64,
    pub model: String,
}

/// A conversation with its full message log.
#[derive(Debug, Serialize)]
pub struct ChatDetail {
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}

pub async fn list_chats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<ChatSession>>> {
    let sessions = state.store.list_chat_sessions(user.id()).await?;
    Ok(Json(sessions))
}

#[instrument(skip(state, request))]
pub async fn create_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateChatRequest>,
) -> ApiResult<(StatusCode, Json<ChatSession>)> {
    if request.model.trim().is_empty() {
        return Err(ApiError::bad_request("Provider ID and model are required"));
    }

    if state.store.get_provider(request.provider_id).await?.is_none() {
        return Err(ApiError::not_found("Provider not found"));
    }

    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string());

    let session = state
        .store
        .create_chat_session(NewChatSession {
            user_id: user.id(),
            title,
            provider_id: request.provider_id,
            model: request.model,
        })
        .await?;

    info!(chat_id = session.id, user_id = user.id(), "Created chat session");
    Ok((StatusCode::CREATED, Json(session)))
}

/// Load a session and check the caller owns it.
async fn owned_session(state: &AppState, user: CurrentUser, id: i64) -> ApiResult<ChatSession> {
    let session = state
        .store
        .get_chat_session(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat session not found"))?;

    if session.user_id != user.id() {
        return Err(ApiError::forbidden("Not authorized to access this chat"));
    }
    Ok(session)
}

pub async fn get_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ChatDetail>> {
    let session = owned_session(&state, user, id).await?;
    let messages = state.store.get_chat_messages(id).await?;
    Ok(Json(ChatDetail { session, messages }))
}

#[instrument(skip(state))]
pub async fn delete_chat(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    owned_session(&state, user, id).await?;
    state.store.delete_chat_session(id).await?;
    info!(chat_id = id, "Deleted chat session");
    Ok(StatusCode::NO_CONTENT)
}
