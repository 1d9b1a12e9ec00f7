//! Realtime frames exchanged over the persistent connection.

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::messages::ChatMessage;

// ============================================================================
// Client -> Server
// ============================================================================

/// Frames sent from a client to the gateway.
///
/// A frame that fails to parse into one of these variants (bad JSON, unknown
/// `type`, missing fields) is dropped by the gateway without a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Start viewing a conversation. Replaces any previous subscription.
    Subscribe { chat_id: i64 },

    /// Stop viewing a conversation.
    Unsubscribe { chat_id: i64 },

    /// Submit a user turn to a conversation.
    ChatMessage { session_id: i64, content: String },

    /// Latency probe; answered with a pong carrying the same timestamp.
    Ping { timestamp: Number },
}

// ============================================================================
// Server -> Client
// ============================================================================

/// Frames sent from the gateway to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// A persisted message, fanned out to every subscriber of the conversation.
    ChatMessage { session_id: i64, message: ChatMessage },

    /// Sent only to the connection whose frame caused the failure.
    Error { message: String },

    /// Reply to a client ping.
    Pong { timestamp: Number },
}

impl ServerFrame {
    pub fn chat_message(message: ChatMessage) -> Self {
        Self::ChatMessage {
            session_id: message.session_id,
            message,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
