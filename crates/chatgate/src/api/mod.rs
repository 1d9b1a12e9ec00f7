//! HTTP API module.
//!
//! REST endpoints for providers and conversations, plus the realtime
//! WebSocket route.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{ChatDetail, CreateChatRequest, HealthResponse, ProviderView};
pub use routes::create_router;
pub use state::AppState;
