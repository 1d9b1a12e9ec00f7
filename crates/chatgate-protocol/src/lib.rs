//! Wire types for the chatgate realtime channel.
//!
//! Every frame on the channel is a UTF-8 JSON object discriminated by a `type`
//! field. Field names are camelCase on the wire.
//!
//! ```text
//! Client --[ClientFrame: subscribe | unsubscribe | chat_message | ping]--> Gateway
//! Client <--[ServerFrame: chat_message | error | pong]------------------- Gateway
//! ```
//!
//! Messages are persistent and owned by the conversation store. Frames are
//! ephemeral and only ever describe or carry a message.

pub mod frames;
pub mod messages;

pub use frames::{ClientFrame, ServerFrame};
pub use messages::{ChatMessage, ChatRole};
