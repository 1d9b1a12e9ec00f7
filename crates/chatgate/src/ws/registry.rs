//! Process-wide table of which connection is viewing which conversation.

use dashmap::DashMap;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatgate_protocol::ServerFrame;

use super::connection::{ConnectionId, Outbox, OutboxReceiver};

/// Default per-connection outbox capacity.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct Subscriptions {
    /// Conversation id -> connections viewing it. Never holds empty sets.
    by_session: HashMap<i64, HashSet<ConnectionId>>,
    /// Connection -> the one conversation it views.
    by_connection: HashMap<ConnectionId, i64>,
}

impl Subscriptions {
    fn detach(&mut self, conn: ConnectionId) -> Option<i64> {
        let session_id = self.by_connection.remove(&conn)?;
        if let Some(set) = self.by_session.get_mut(&session_id) {
            set.remove(&conn);
            if set.is_empty() {
                self.by_session.remove(&session_id);
            }
        }
        Some(session_id)
    }
}

/// Snapshot of registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub connections: usize,
    pub conversations: usize,
    pub frames_broadcast: u64,
    pub frames_dropped: u64,
}

/// Subscription registry.
///
/// Every subscribe, unsubscribe, drop and broadcast runs as one critical
/// section over the subscription maps, so a connection is never observed in
/// two sets.
pub struct SubscriptionRegistry {
    subscriptions: Mutex<Subscriptions>,
    outboxes: DashMap<ConnectionId, Outbox>,
    next_id: AtomicU64,
    outbox_capacity: usize,
    frames_broadcast: AtomicU64,
    frames_dropped: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            subscriptions: Mutex::new(Subscriptions::default()),
            outboxes: DashMap::new(),
            next_id: AtomicU64::new(1),
            outbox_capacity,
            frames_broadcast: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Subscriptions> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a connection id and its outbox.
    pub fn register(&self) -> (ConnectionId, OutboxReceiver) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbox, rx) = Outbox::new(self.outbox_capacity);
        self.outboxes.insert(id, outbox);
        debug!("Registered realtime connection {}", id);
        (id, rx)
    }

    /// Make `session_id` the only conversation `conn` views.
    ///
    /// Returns the conversation it was moved away from, if any.
    pub fn subscribe(&self, conn: ConnectionId, session_id: i64) -> Option<i64> {
        let mut subs = self.lock();
        let previous = subs.detach(conn);
        subs.by_session.entry(session_id).or_default().insert(conn);
        subs.by_connection.insert(conn, session_id);
        drop(subs);

        info!("Connection {} subscribed to chat {}", conn, session_id);
        previous.filter(|&prev| prev != session_id)
    }

    /// Remove `conn` from `session_id` if it is there. No-op otherwise.
    pub fn unsubscribe(&self, conn: ConnectionId, session_id: i64) -> bool {
        let mut subs = self.lock();
        if subs.by_connection.get(&conn) != Some(&session_id) {
            return false;
        }
        subs.detach(conn);
        drop(subs);

        info!("Connection {} unsubscribed from chat {}", conn, session_id);
        true
    }

    /// Forget `conn` entirely. Safe to call more than once.
    pub fn drop_connection(&self, conn: ConnectionId) -> Option<i64> {
        let previous = self.lock().detach(conn);
        self.outboxes.remove(&conn);
        debug!("Dropped realtime connection {}", conn);
        previous
    }

    /// Queue `frame` for every connection viewing `session_id`.
    ///
    /// The frame is serialized once. Connections whose transport is gone are
    /// skipped. Returns how many connections it was queued for.
    pub fn broadcast(&self, session_id: i64, frame: &ServerFrame) -> usize {
        let Some(payload) = encode(frame) else {
            return 0;
        };

        let subs = self.lock();
        let Some(targets) = subs.by_session.get(&session_id) else {
            return 0;
        };

        let mut delivered = 0;
        for conn in targets {
            match self.outboxes.get(conn) {
                Some(outbox) if outbox.push(payload.clone()) => delivered += 1,
                _ => debug!("Skipping closed connection {} for chat {}", conn, session_id),
            }
        }
        drop(subs);

        self.frames_broadcast
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Queue `frame` for a single connection.
    pub fn send_to(&self, conn: ConnectionId, frame: &ServerFrame) -> bool {
        let Some(payload) = encode(frame) else {
            return false;
        };
        self.outboxes
            .get(&conn)
            .is_some_and(|outbox| outbox.push(payload))
    }

    /// Account for frames a lagging writer lost.
    pub fn record_dropped(&self, conn: ConnectionId, count: u64) {
        self.frames_dropped.fetch_add(count, Ordering::Relaxed);
        warn!(
            "Connection {} fell behind, dropped {} oldest frames",
            conn, count
        );
    }

    pub fn subscription_of(&self, conn: ConnectionId) -> Option<i64> {
        self.lock().by_connection.get(&conn).copied()
    }

    /// Connections viewing `session_id`, in id order.
    pub fn subscribers(&self, session_id: i64) -> Vec<ConnectionId> {
        let mut conns: Vec<ConnectionId> = self
            .lock()
            .by_session
            .get(&session_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        conns.sort();
        conns
    }

    pub fn stats(&self) -> RegistryStats {
        let conversations = self.lock().by_session.len();
        RegistryStats {
            connections: self.outboxes.len(),
            conversations,
            frames_broadcast: self.frames_broadcast.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

fn encode(frame: &ServerFrame) -> Option<Arc<str>> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!("Failed to serialize frame: {}", e);
            None
        }
    }
}
