//! Realtime chat delivery.
//!
//! ```text
//!   socket ──► handler ──► Gateway::handle_text ──┬─► SubscriptionRegistry (subscribe / unsubscribe)
//!     ▲                                           └─► MessageProcessor ──► registry.broadcast
//!     └──── writer task ◄── Outbox ◄───────────────────────────────────────────┘
//! ```
//!
//! Each connection gets a [`ConnectionSession`] and a bounded [`Outbox`]. The
//! registry maps every conversation to the connections viewing it; a
//! connection views at most one conversation at a time.

mod connection;
mod gateway;
mod handler;
mod registry;

pub use connection::{ConnectionId, ConnectionSession, ConnectionState, Outbox, OutboxReceiver};
pub use gateway::{EMPTY_CONTENT_MESSAGE, Gateway};
pub use handler::ws_handler;
pub use registry::{DEFAULT_OUTBOX_CAPACITY, RegistryStats, SubscriptionRegistry};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Realtime endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Route the WebSocket endpoint is mounted at.
    pub path: String,
    /// Frames buffered per connection before the oldest are discarded.
    pub outbox_capacity: usize,
    /// Seconds between keepalive pings.
    pub ping_interval_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            ping_interval_secs: 30,
        }
    }
}

impl RealtimeConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}
