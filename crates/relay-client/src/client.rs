//! `RealtimeClient`: a supervisor bundled with its dispatcher and topics.

use std::sync::Arc;

use relay_core::{Envelope, EventType};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, HandlerGuard};
use crate::supervisor::{ConnectionState, ConnectionSupervisor};
use crate::topics::{SubscriptionManager, TopicMembership};
use crate::transport::{Connector, WsConnector};

/// Caller-facing realtime client.
///
/// Create one per logical session and share it; there is no process-wide
/// instance.
pub struct RealtimeClient {
    supervisor: Arc<ConnectionSupervisor>,
    dispatcher: Arc<Dispatcher>,
    subscriptions: SubscriptionManager,
}

impl RealtimeClient {
    /// Client over a real WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Client over an arbitrary connector.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let dispatcher = Dispatcher::new();
        let topics = TopicMembership::new();
        let supervisor =
            ConnectionSupervisor::new(config, connector, dispatcher.clone(), topics.clone());
        let subscriptions = SubscriptionManager::new(topics, supervisor.clone());
        Self {
            supervisor,
            dispatcher,
            subscriptions,
        }
    }

    /// Start connecting. No-op while already connected or connecting.
    pub fn connect(&self) {
        self.supervisor.connect();
    }

    /// Close and stop reconnecting.
    pub fn disconnect(&self) {
        self.supervisor.disconnect();
    }

    /// Identity sent as `authenticate` on every open, and immediately when
    /// it changes while connected.
    pub fn set_user_id(&self, user_id: Option<String>) {
        self.supervisor.set_user_id(user_id);
    }

    /// Register a handler for `event_type` (or `"*"`).
    pub fn on<F>(&self, event_type: impl Into<EventType>, handler: F) -> HandlerGuard
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.dispatcher.register_handler(event_type, handler)
    }

    /// Ask the server to stream `topic`.
    pub fn subscribe_to_topic(&self, topic: &str) -> bool {
        self.subscriptions.subscribe_to_topic(topic)
    }

    /// Stop streaming `topic`.
    pub fn unsubscribe_from_topic(&self, topic: &str) -> bool {
        self.subscriptions.unsubscribe_from_topic(topic)
    }

    /// Topics currently joined.
    pub fn topics(&self) -> Vec<String> {
        self.subscriptions.topics()
    }

    /// Write an envelope if connected.
    pub fn send(&self, envelope: &Envelope) -> bool {
        self.supervisor.send(envelope)
    }

    /// Lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Whether a socket is open.
    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    /// Whether the server acknowledged the identity.
    pub fn is_authenticated(&self) -> bool {
        self.supervisor.is_authenticated()
    }

    /// The underlying supervisor.
    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    /// The underlying dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
