//! WebSocket client connection state.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::{ConnectionId, Envelope, EventType};
use tokio::sync::mpsc;
use tracing::warn;

/// Represents a connected WebSocket client.
///
/// The registry holds the sending half of the outbound queue; the socket
/// itself is owned by the session task that drains it.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Identity asserted via `identify` / `authenticate`.
    user_id: Mutex<Option<String>>,
    /// Event types this client wants to receive.
    subscriptions: Mutex<HashSet<EventType>>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded to the last ping.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to full or closed channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection with no identity and no subscriptions.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            user_id: Mutex::new(None),
            subscriptions: Mutex::new(HashSet::new()),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Record the client-asserted user identity.
    pub fn set_user_id(&self, user_id: String) {
        *self.user_id.lock() = Some(user_id);
    }

    /// The current identity, if any.
    pub fn user_id(&self) -> Option<String> {
        self.user_id.lock().clone()
    }

    /// Whether this connection is identified as `user_id`.
    pub fn is_user(&self, user_id: &str) -> bool {
        self.user_id.lock().as_deref() == Some(user_id)
    }

    /// Add a subscription. Returns `false` if already present.
    pub fn subscribe(&self, event_type: EventType) -> bool {
        self.subscriptions.lock().insert(event_type)
    }

    /// Remove a subscription. Returns `false` if it was not present.
    pub fn unsubscribe(&self, event_type: &EventType) -> bool {
        self.subscriptions.lock().remove(event_type)
    }

    /// Whether broadcasts of `event_type` should reach this client.
    pub fn is_subscribed(&self, event_type: &EventType) -> bool {
        self.subscriptions.lock().contains(event_type)
    }

    /// Snapshot of current subscriptions, sorted.
    pub fn subscriptions(&self) -> Vec<EventType> {
        let mut subs: Vec<_> = self.subscriptions.lock().iter().cloned().collect();
        subs.sort();
        subs
    }

    /// Whether the write task is still draining the queue.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Enqueue a serialized frame for the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize an envelope and enqueue it.
    pub fn send_envelope(&self, envelope: &Envelope) -> bool {
        match envelope.to_json() {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to serialize envelope");
                false
            }
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or any frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
