//! Request identity.
//!
//! Authentication proper happens in front of this service. The upstream
//! layer forwards the authenticated user as an `X-User-Id` header; this
//! module turns that into a [`CurrentUser`] for handlers.

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// User assumed when no header is present. Leave unset outside
    /// single-user deployments.
    pub default_user_id: Option<i64>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing user identity")]
    MissingUser,

    #[error("Invalid user identity header")]
    InvalidUserHeader,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": "UNAUTHORIZED",
        });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Shared identity settings.
#[derive(Debug, Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
}

impl AuthState {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn resolve(&self, header: Option<&str>) -> Result<CurrentUser, AuthError> {
        match header {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(CurrentUser)
                .map_err(|_| AuthError::InvalidUserHeader),
            None => self
                .config
                .default_user_id
                .map(CurrentUser)
                .ok_or(AuthError::MissingUser),
        }
    }
}

/// The user a request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub i64);

impl CurrentUser {
    pub fn id(&self) -> i64 {
        self.0
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or(AuthError::MissingUser)
    }
}

/// Resolve the caller and inject [`CurrentUser`] into request extensions.
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let header = req
        .headers()
        .get(USER_ID_HEADER)
        .map(|h| h.to_str().map_err(|_| AuthError::InvalidUserHeader))
        .transpose()?;

    let user = auth.resolve(header)?;
    debug!("Request authenticated as user {}", user.id());
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
