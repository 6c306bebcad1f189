//! Connection registry and subscription-filtered broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use relay_core::{ConnectionId, Envelope, Event};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::handler::handle_message;
use crate::history::MessageHistory;
use crate::metrics::{
    RELAY_BROADCASTS_TOTAL, RELAY_DELIVERIES_TOTAL, RELAY_DROPS_TOTAL, RELAY_HISTORY_SIZE,
};

/// Owns every live connection and the recent-message history.
///
/// Constructed once at startup and shared as `Arc<Hub>` between the HTTP
/// layer and whatever business code produces events.
pub struct Hub {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Recently broadcast envelopes. Held across the whole of a broadcast so
    /// stamping, recording, and fan-out happen in one order for everyone.
    history: Mutex<MessageHistory>,
}

impl Hub {
    /// Create an empty hub retaining up to `history_capacity` envelopes.
    pub fn new(history_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            history: Mutex::new(MessageHistory::new(history_capacity)),
        }
    }

    /// Register a new connection with no identity and no subscriptions.
    pub fn add_connection(&self, tx: mpsc::Sender<Arc<String>>) -> Arc<ClientConnection> {
        let connection = Arc::new(ClientConnection::new(ConnectionId::new(), tx));
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection.clone());
        debug!(conn_id = %connection.id, "connection registered");
        connection
    }

    /// Deregister a connection. Returns `false` if it was already gone.
    pub fn remove_connection(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.write().remove(id).is_some();
        if removed {
            debug!(conn_id = %id, "connection removed");
        }
        removed
    }

    /// Look up a live connection.
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Apply an inbound text frame from `id`, queueing any reply to it.
    pub fn handle_inbound(&self, id: &ConnectionId, raw: &str) {
        let Some(conn) = self.connection(id) else {
            debug!(conn_id = %id, "inbound frame for unknown connection");
            return;
        };
        if let Some(reply) = handle_message(&conn, raw) {
            if !conn.send_envelope(&reply) {
                warn!(conn_id = %id, "failed to enqueue reply");
            }
        }
    }

    /// Broadcast to every connection subscribed to `event`'s type.
    pub fn broadcast(&self, event: Event) -> Envelope {
        self.fan_out(event, |_| true)
    }

    /// Broadcast to subscribed connections identified as `user_id`.
    pub fn broadcast_to_user(&self, user_id: &str, event: Event) -> Envelope {
        self.fan_out(event, |c| c.is_user(user_id))
    }

    /// Broadcast to subscribed connections identified as any of `user_ids`.
    pub fn broadcast_to_users<S: AsRef<str>>(&self, user_ids: &[S], event: Event) -> Envelope {
        self.fan_out(event, |c| {
            c.user_id()
                .is_some_and(|u| user_ids.iter().any(|t| t.as_ref() == u))
        })
    }

    fn fan_out<F>(&self, event: Event, target: F) -> Envelope
    where
        F: Fn(&ClientConnection) -> bool,
    {
        let mut history = self.history.lock();
        let envelope = event.stamp_for_broadcast();
        history.push(envelope.clone());
        #[allow(clippy::cast_precision_loss)]
        let history_size = history.len() as f64;
        gauge!(RELAY_HISTORY_SIZE).set(history_size);
        counter!(RELAY_BROADCASTS_TOTAL).increment(1);

        let json = match envelope.to_json() {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = %envelope.event_type, error = %e, "failed to serialize envelope");
                return envelope;
            }
        };

        let conns = self.connections.read();
        let mut delivered: u64 = 0;
        let mut dropped: u64 = 0;
        for conn in conns.values() {
            if !conn.is_open() || !conn.is_subscribed(&envelope.event_type) || !target(conn) {
                continue;
            }
            if conn.send(json.clone()) {
                delivered += 1;
            } else {
                dropped += 1;
                warn!(
                    conn_id = %conn.id,
                    event_type = %envelope.event_type,
                    drops = conn.drop_count(),
                    "failed to enqueue broadcast"
                );
            }
        }
        drop(conns);
        drop(history);

        counter!(RELAY_DELIVERIES_TOTAL).increment(delivered);
        if dropped > 0 {
            counter!(RELAY_DROPS_TOTAL).increment(dropped);
        }
        debug!(
            event_type = %envelope.event_type,
            message_id = envelope.message_id.as_deref().unwrap_or_default(),
            delivered,
            dropped,
            "broadcast"
        );
        envelope
    }

    /// Number of registered connections.
    pub fn connected_clients_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Number of envelopes currently held in history.
    pub fn message_queue_size(&self) -> usize {
        self.history.lock().len()
    }

    /// The last `min(limit, size)` broadcast envelopes, oldest first.
    pub fn recent_messages(&self, limit: usize) -> Vec<Envelope> {
        self.history.lock().recent(limit)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(1000)
    }
}
