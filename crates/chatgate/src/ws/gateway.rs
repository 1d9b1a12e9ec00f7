//! Transport-independent frame dispatcher.

use log::{debug, info, warn};
use std::sync::Arc;

use chatgate_protocol::{ClientFrame, ServerFrame};

use super::connection::{ConnectionSession, OutboxReceiver};
use super::registry::SubscriptionRegistry;
use crate::chat::MessageProcessor;

/// Error text for blank chat submissions.
pub const EMPTY_CONTENT_MESSAGE: &str = "Message content cannot be empty";

/// Drives the subscription registry and message processor from inbound
/// frames. The socket layer owns one [`ConnectionSession`] per connection and
/// feeds it through here.
pub struct Gateway {
    registry: Arc<SubscriptionRegistry>,
    processor: Arc<MessageProcessor>,
}

impl Gateway {
    pub fn new(registry: Arc<SubscriptionRegistry>, processor: Arc<MessageProcessor>) -> Self {
        Self {
            registry,
            processor,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Accept a connection: fresh session in `Open`, plus its outbox.
    pub fn open_connection(&self) -> (ConnectionSession, OutboxReceiver) {
        let (id, outbox) = self.registry.register();
        info!("Realtime connection {} opened", id);
        (ConnectionSession::new(id), outbox)
    }

    /// Handle one inbound text frame.
    pub async fn handle_text(&self, conn: &mut ConnectionSession, text: &str) {
        if conn.is_closed() {
            return;
        }

        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", conn.id(), e);
                return;
            }
        };

        match frame {
            ClientFrame::Subscribe { chat_id } => {
                self.registry.subscribe(conn.id(), chat_id);
                conn.subscribe(chat_id);
            }

            ClientFrame::Unsubscribe { chat_id } => {
                if conn.unsubscribe(chat_id) {
                    self.registry.unsubscribe(conn.id(), chat_id);
                } else {
                    debug!("{} is not subscribed to chat {}, ignoring", conn.id(), chat_id);
                }
            }

            ClientFrame::ChatMessage {
                session_id,
                content,
            } => self.handle_chat_message(conn, session_id, &content).await,

            ClientFrame::Ping { timestamp } => {
                self.reply(conn, ServerFrame::Pong { timestamp });
            }
        }
    }

    async fn handle_chat_message(&self, conn: &ConnectionSession, session_id: i64, content: &str) {
        if content.trim().is_empty() {
            self.reply(conn, ServerFrame::error(EMPTY_CONTENT_MESSAGE));
            return;
        }

        match self.processor.process_user_message(session_id, content).await {
            Ok(exchange) => {
                let user = ServerFrame::chat_message(exchange.user_message);
                let assistant = ServerFrame::chat_message(exchange.assistant_message);
                let fanout = self.registry.broadcast(session_id, &user);
                self.registry.broadcast(session_id, &assistant);
                debug!(
                    "Chat {}: exchange from {} delivered to {} connections",
                    session_id,
                    conn.id(),
                    fanout
                );
            }
            Err(e) => {
                warn!("Chat {}: failed to process message from {}: {}", session_id, conn.id(), e);
                self.reply(
                    conn,
                    ServerFrame::error(format!("Failed to process message: {}", e)),
                );
            }
        }
    }

    fn reply(&self, conn: &ConnectionSession, frame: ServerFrame) {
        if !self.registry.send_to(conn.id(), &frame) {
            debug!("{} is gone, reply skipped", conn.id());
        }
    }

    /// Tear down a connection. Runs for every close reason.
    pub fn close_connection(&self, conn: &mut ConnectionSession) {
        let was_viewing = conn.close();
        self.registry.drop_connection(conn.id());
        match was_viewing {
            Some(chat_id) => info!("Realtime connection {} closed (was on chat {})", conn.id(), chat_id),
            None => info!("Realtime connection {} closed", conn.id()),
        }
    }
}
