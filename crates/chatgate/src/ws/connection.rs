//! Per-connection state and outbound queue.

use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Process-unique handle for one realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, not viewing any conversation.
    Open,
    /// Viewing exactly one conversation.
    Subscribed(i64),
    /// Transport gone. Terminal.
    Closed,
}

/// State owned by the task serving one connection.
#[derive(Debug)]
pub struct ConnectionSession {
    id: ConnectionId,
    state: ConnectionState,
}

impl ConnectionSession {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: ConnectionState::Open,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscribed_to(&self) -> Option<i64> {
        match self.state {
            ConnectionState::Subscribed(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Move to `Subscribed(chat_id)`. Ignored once closed.
    pub fn subscribe(&mut self, chat_id: i64) {
        if !self.is_closed() {
            self.state = ConnectionState::Subscribed(chat_id);
        }
    }

    /// Return to `Open` if currently subscribed to `chat_id`.
    pub fn unsubscribe(&mut self, chat_id: i64) -> bool {
        if self.subscribed_to() == Some(chat_id) {
            self.state = ConnectionState::Open;
            true
        } else {
            false
        }
    }

    /// Enter `Closed`, returning the conversation that was being viewed.
    pub fn close(&mut self) -> Option<i64> {
        let previous = self.subscribed_to();
        self.state = ConnectionState::Closed;
        previous
    }
}

/// Receiving half of an [`Outbox`], drained by the connection's writer.
pub type OutboxReceiver = broadcast::Receiver<Arc<str>>;

/// Bounded outbound queue for one connection.
///
/// Pushing never blocks. When the reader falls behind by more than the
/// capacity, the oldest frames are overwritten and the reader observes a lag.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: broadcast::Sender<Arc<str>>,
}

impl Outbox {
    pub fn new(capacity: usize) -> (Self, OutboxReceiver) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// True while the writer still holds the receiving half.
    pub fn is_open(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    /// Queue a frame. Returns false if the connection is gone.
    pub fn push(&self, frame: Arc<str>) -> bool {
        self.tx.send(frame).is_ok()
    }
}
