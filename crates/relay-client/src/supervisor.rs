//! Connection state machine with fixed-delay reconnection.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open──▶ Open ──authenticate──▶ Authenticating ──authenticated──▶ Authenticated
//!                       ▲                 │                          │                               │
//!                       │                 └──────────── close / connect failure ─────────────────────┘
//!                       │                                      ▼
//!                       └──────── timer (attempts < max) ── Closed
//! ```
//!
//! Every socket task carries the generation it was started under. Anything
//! that supersedes a socket (`disconnect`, a reconnect) bumps the generation,
//! so late events from the old socket are ignored.

use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::event_type::known;
use relay_core::{Envelope, Event};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::topics::TopicMembership;
use crate::transport::{Connector, Outbound, SocketEvent};

/// Where the supervisor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Socket open, no identity sent.
    Open,
    /// `authenticate` sent, waiting for `authenticated`.
    Authenticating,
    /// Server acknowledged the identity.
    Authenticated,
    /// No socket. A reconnect may be pending.
    Closed,
}

impl ConnectionState {
    /// Whether a socket is open (or about to be).
    fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Closed)
    }

    /// Whether frames can be written.
    fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::Authenticating | Self::Authenticated)
    }
}

struct Inner {
    state: ConnectionState,
    generation: u64,
    attempts: u32,
    user_id: Option<String>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    reconnect: Option<CancellationToken>,
}

/// Owns at most one socket and keeps it alive according to [`ClientConfig`].
pub struct ConnectionSupervisor {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
    topics: Arc<TopicMembership>,
    inner: Mutex<Inner>,
}

impl ConnectionSupervisor {
    /// Create an idle supervisor. Inbound envelopes go to `dispatcher`;
    /// `topics` are re-subscribed every time a socket opens.
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<Dispatcher>,
        topics: Arc<TopicMembership>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            connector,
            dispatcher,
            topics,
            inner: Mutex::new(Inner {
                state: ConnectionState::Idle,
                generation: 0,
                attempts: 0,
                user_id: None,
                outbound: None,
                reconnect: None,
            }),
        })
    }

    /// Open a socket unless one is already open or opening.
    ///
    /// Cancels any pending reconnect timer. Must be called within a Tokio
    /// runtime.
    pub fn connect(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if inner.state.is_active() {
            debug!(state = ?inner.state, "connect ignored, already active");
            return;
        }
        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }
        self.start_locked(&mut inner);
    }

    /// Close the socket and stop reconnecting.
    ///
    /// No reconnect timer fires after this returns.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        if let Some(timer) = inner.reconnect.take() {
            timer.cancel();
        }
        inner.generation += 1;
        if let Some(tx) = inner.outbound.take() {
            let _ = tx.send(Outbound::Close);
        }
        inner.attempts = 0;
        inner.state = ConnectionState::Closed;
        info!("disconnected");
    }

    /// Write an envelope. Returns `false` (and logs) when not open.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let inner = self.inner.lock();
        let Some(tx) = inner.outbound.as_ref().filter(|_| inner.state.is_open()) else {
            warn!(event_type = %envelope.event_type, state = ?inner.state, "not connected, dropping outbound envelope");
            return false;
        };
        match envelope.to_json() {
            Ok(json) => tx.send(Outbound::Text(json)).is_ok(),
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound envelope");
                false
            }
        }
    }

    /// Set (or clear) the identity sent on open.
    ///
    /// A new identity set while a socket is open is sent right away, and the
    /// state drops back to `Authenticating` until the server acknowledges it.
    /// Clearing the identity has no wire message; the server keeps the old
    /// user until the next open.
    pub fn set_user_id(&self, user_id: Option<String>) {
        let mut inner = self.inner.lock();
        if inner.user_id == user_id {
            return;
        }
        inner.user_id = user_id;
        if inner.state.is_open() {
            Self::authenticate_locked(&mut inner);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Whether a socket is open.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().state.is_open()
    }

    /// Whether the server acknowledged the identity on the current socket.
    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().state == ConnectionState::Authenticated
    }

    /// Reconnects scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    fn start_locked(self: &Arc<Self>, inner: &mut Inner) {
        inner.generation += 1;
        inner.state = ConnectionState::Connecting;
        let generation = inner.generation;
        debug!(generation, url = %self.config.url, "connecting");
        drop(tokio::spawn(Arc::clone(self).run_socket(generation)));
    }

    fn authenticate_locked(inner: &mut Inner) {
        let (Some(user_id), Some(tx)) = (inner.user_id.as_deref(), inner.outbound.as_ref()) else {
            return;
        };
        match Event::authenticate(user_id).stamp_now().to_json() {
            Ok(json) => {
                if tx.send(Outbound::Text(json)).is_ok() {
                    inner.state = ConnectionState::Authenticating;
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize authenticate"),
        }
    }

    async fn run_socket(self: Arc<Self>, generation: u64) {
        let mut socket = match self.connector.connect(&self.config.url).await {
            Ok(socket) => socket,
            Err(e) => {
                warn!(error = %e, generation, "connect failed");
                self.on_closed(generation);
                return;
            }
        };

        if !self.on_open(generation, socket.outbound.clone()) {
            let _ = socket.outbound.send(Outbound::Close);
            return;
        }

        while let Some(event) = socket.inbound.recv().await {
            match event {
                SocketEvent::Message(raw) => {
                    if !self.on_message(generation, &raw) {
                        break;
                    }
                }
                SocketEvent::Error(e) => warn!(error = %e, generation, "socket error"),
                SocketEvent::Closed => break,
            }
        }
        self.on_closed(generation);
    }

    fn on_open(&self, generation: u64, tx: mpsc::UnboundedSender<Outbound>) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                debug!(generation, "stale socket opened, closing");
                return false;
            }
            inner.state = ConnectionState::Open;
            inner.attempts = 0;
            inner.outbound = Some(tx);
            Self::authenticate_locked(&mut inner);
            info!(generation, state = ?inner.state, "connected");
        }

        // Outside the state lock: topic changes take the membership lock first.
        for topic in self.topics.snapshot() {
            let _ = self.send(&Event::subscribe(&topic).stamp_now());
        }
        true
    }

    /// Returns `false` once this socket has been superseded.
    fn on_message(&self, generation: u64, raw: &str) -> bool {
        let envelope = match Envelope::from_json(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping unparseable frame");
                return true;
            }
        };
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return false;
            }
            if envelope.event_type.as_str() == known::AUTHENTICATED && inner.state.is_open() {
                inner.state = ConnectionState::Authenticated;
                info!("authenticated");
            }
        }
        let _ = self.dispatcher.dispatch_envelope(&envelope);
        true
    }

    fn on_closed(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.outbound = None;
        inner.state = ConnectionState::Closed;

        if inner.attempts >= self.config.max_reconnect_attempts {
            warn!(
                attempts = inner.attempts,
                "reconnect attempts exhausted, giving up"
            );
            return;
        }
        inner.attempts += 1;
        let timer = CancellationToken::new();
        inner.reconnect = Some(timer.clone());
        info!(
            attempt = inner.attempts,
            delay_ms = u64::try_from(self.config.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "connection closed, scheduling reconnect"
        );

        let this = Arc::clone(self);
        let delay = self.config.reconnect_delay;
        drop(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => this.fire_reconnect(&timer),
                () = timer.cancelled() => {}
            }
        }));
    }

    fn fire_reconnect(self: &Arc<Self>, timer: &CancellationToken) {
        let mut inner = self.inner.lock();
        // cancellation and this check share the lock
        if timer.is_cancelled() || inner.state.is_active() {
            return;
        }
        inner.reconnect = None;
        self.start_locked(&mut inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockConnector, MockPeer};
    use relay_core::EventType;
    use serde_json::Value;
    use std::time::Duration;

    const DELAY: Duration = Duration::from_millis(3000);

    struct Harness {
        supervisor: Arc<ConnectionSupervisor>,
        connector: Arc<MockConnector>,
        peers: mpsc::UnboundedReceiver<MockPeer>,
        topics: Arc<TopicMembership>,
        dispatcher: Arc<Dispatcher>,
    }

    fn harness(max_attempts: u32) -> Harness {
        let (connector, peers) = MockConnector::new();
        let topics = TopicMembership::new();
        let dispatcher = Dispatcher::new();
        let config = ClientConfig {
            url: "ws://mock/api/ws".into(),
            max_reconnect_attempts: max_attempts,
            reconnect_delay: DELAY,
        };
        let supervisor = ConnectionSupervisor::new(
            config,
            connector.clone(),
            dispatcher.clone(),
            topics.clone(),
        );
        Harness {
            supervisor,
            connector,
            peers,
            topics,
            dispatcher,
        }
    }

    /// Let spawned tasks run without reaching the reconnect delay.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn types(frames: &[Value]) -> Vec<String> {
        frames
            .iter()
            .map(|f| f["type"].as_str().unwrap_or_default().to_owned())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn connect_opens_one_socket() {
        let mut h = harness(5);
        assert_eq!(h.supervisor.state(), ConnectionState::Idle);
        h.supervisor.connect();
        assert_eq!(h.supervisor.state(), ConnectionState::Connecting);
        h.supervisor.connect();
        settle().await;

        assert_eq!(h.supervisor.state(), ConnectionState::Open);
        assert!(h.supervisor.is_connected());
        h.supervisor.connect();
        settle().await;
        assert_eq!(h.connector.attempts(), 1);
        assert!(h.peers.try_recv().is_ok());
        assert!(h.peers.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn anonymous_connect_does_not_authenticate() {
        let mut h = harness(5);
        h.supervisor.connect();
        settle().await;
        let mut peer = h.peers.recv().await.unwrap();
        assert!(peer.drain_sent().is_empty());
        assert!(!h.supervisor.is_authenticated());
        assert_eq!(h.supervisor.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn identity_authenticates_on_open() {
        let mut h = harness(5);
        h.supervisor.set_user_id(Some("u1".into()));
        h.supervisor.connect();
        settle().await;
        let mut peer = h.peers.recv().await.unwrap();

        let sent = peer.drain_sent();
        assert_eq!(types(&sent), vec!["authenticate"]);
        assert_eq!(sent[0]["data"]["userId"], "u1");
        assert_eq!(h.supervisor.state(), ConnectionState::Authenticating);

        peer.deliver(r#"{"type":"authenticated","data":{"userId":"u1"},"timestamp":1}"#);
        settle().await;
        assert!(h.supervisor.is_authenticated());
        assert_eq!(h.supervisor.state(), ConnectionState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn set_user_id_while_open_authenticates() {
        let mut h = harness(5);
        h.supervisor.connect();
        settle().await;
        let mut peer = h.peers.recv().await.unwrap();
        h.supervisor.set_user_id(Some("late".into()));
        assert_eq!(types(&peer.drain_sent()), vec!["authenticate"]);
        assert_eq!(h.supervisor.state(), ConnectionState::Authenticating);
    }

    #[tokio::test(start_paused = true)]
    async fn identity_change_reauthenticates_open_socket() {
        let mut h = harness(5);
        h.supervisor.set_user_id(Some("u1".into()));
        h.supervisor.connect();
        settle().await;
        let mut peer = h.peers.recv().await.unwrap();
        let _ = peer.drain_sent();
        peer.deliver(r#"{"type":"authenticated","data":{"userId":"u1"},"timestamp":1}"#);
        settle().await;
        assert!(h.supervisor.is_authenticated());

        h.supervisor.set_user_id(Some("u1".into()));
        assert!(peer.drain_sent().is_empty());
        assert!(h.supervisor.is_authenticated());

        h.supervisor.set_user_id(Some("u2".into()));
        let sent = peer.drain_sent();
        assert_eq!(types(&sent), vec!["authenticate"]);
        assert_eq!(sent[0]["data"]["userId"], "u2");
        assert_eq!(h.supervisor.state(), ConnectionState::Authenticating);

        peer.deliver(r#"{"type":"authenticated","data":{"userId":"u2"},"timestamp":2}"#);
        settle().await;
        assert!(h.supervisor.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn open_resubscribes_member_topics() {
        let mut h = harness(5);
        let _ = h.topics.insert(&EventType::new("item:created"));
        let _ = h.topics.insert(&EventType::new("item:deleted"));
        h.supervisor.connect();
        settle().await;
        let mut peer = h.peers.recv().await.unwrap();
        let sent = peer.drain_sent();
        assert_eq!(types(&sent), vec!["subscribe", "subscribe"]);
        assert_eq!(sent[0]["data"]["topicId"], "item:created");
        assert_eq!(sent[1]["data"]["topicId"], "item:deleted");
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_frames_reach_dispatcher() {
        let mut h = harness(5);
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = hits.clone();
        let _g = h.dispatcher.register_handler("item:created", move |_: &Value| {
            let _ = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        h.supervisor.connect();
        settle().await;
        let peer = h.peers.recv().await.unwrap();
        peer.deliver(r#"{"type":"item:created","data":{"id":1},"timestamp":1}"#);
        peer.deliver("garbage");
        settle().await;
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(h.supervisor.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn send_when_closed_returns_false() {
        let h = harness(5);
        assert!(!h.supervisor.send(&Event::pong().stamp_now()));
    }

    #[tokio::test(start_paused = true)]
    async fn close_schedules_reconnect_after_delay() {
        let mut h = harness(5);
        h.supervisor.set_user_id(Some("u1".into()));
        h.supervisor.connect();
        settle().await;
        let peer = h.peers.recv().await.unwrap();
        peer.deliver(r#"{"type":"authenticated","data":{"userId":"u1"}}"#);
        settle().await;
        assert!(h.supervisor.is_authenticated());

        peer.close();
        settle().await;
        assert_eq!(h.supervisor.state(), ConnectionState::Closed);
        assert!(!h.supervisor.is_authenticated());
        assert_eq!(h.supervisor.reconnect_attempts(), 1);

        tokio::time::sleep(DELAY - Duration::from_millis(10)).await;
        assert_eq!(h.connector.attempts(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.connector.attempts(), 2);

        // re-authenticates on the new socket, and attempts reset
        let mut peer2 = h.peers.recv().await.unwrap();
        settle().await;
        assert_eq!(types(&peer2.drain_sent()), vec!["authenticate"]);
        assert_eq!(h.supervisor.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let h = harness(3);
        h.connector.set_fail(true);
        h.supervisor.connect();
        // initial connect + 3 reconnects
        tokio::time::sleep(DELAY * 10).await;
        assert_eq!(h.connector.attempts(), 4);
        assert_eq!(h.supervisor.reconnect_attempts(), 3);
        assert_eq!(h.supervisor.state(), ConnectionState::Closed);
        assert!(!h.supervisor.is_connected());

        // manual connect still works but does not reset attempts
        h.connector.set_fail(false);
        h.supervisor.connect();
        settle().await;
        assert_eq!(h.connector.attempts(), 5);
        assert!(h.supervisor.is_connected());
        assert_eq!(h.supervisor.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let mut h = harness(5);
        h.supervisor.connect();
        settle().await;
        let peer = h.peers.recv().await.unwrap();
        peer.close();
        settle().await;
        assert_eq!(h.supervisor.reconnect_attempts(), 1);

        h.supervisor.disconnect();
        assert_eq!(h.supervisor.reconnect_attempts(), 0);
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.supervisor.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_closes_socket_and_ignores_stale_events() {
        let mut h = harness(5);
        h.supervisor.connect();
        settle().await;
        let mut peer = h.peers.recv().await.unwrap();

        h.supervisor.disconnect();
        assert_eq!(peer.sent.recv().await, Some(Outbound::Close));

        // late close from the superseded socket must not schedule a reconnect
        peer.close();
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.supervisor.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_after_close_cancels_timer() {
        let mut h = harness(5);
        h.supervisor.connect();
        settle().await;
        let peer = h.peers.recv().await.unwrap();
        peer.close();
        settle().await;

        h.supervisor.connect();
        settle().await;
        assert_eq!(h.connector.attempts(), 2);
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(h.connector.attempts(), 2);
    }
}
