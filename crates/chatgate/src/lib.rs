//! chatgate: AI provider gateway with a realtime chat pipeline.
//!
//! A client subscribes to a conversation over WebSocket and submits user
//! turns. Each turn is persisted, sent with the conversation history to the
//! conversation's provider, and the reply is persisted and fanned out to
//! every connection viewing that conversation.

pub mod api;
pub mod auth;
pub mod chat;
pub mod completion;
pub mod config;
pub mod server;
pub mod store;
pub mod ws;
