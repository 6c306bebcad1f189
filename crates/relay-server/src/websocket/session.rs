//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::Event;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::hub::Hub;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_MESSAGES_RECEIVED_TOTAL,
};

/// How long the writer gets to flush a close frame on teardown.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the hub
/// 2. Queues `connection:established` with the client ID
/// 3. Forwards queued envelopes and periodic Ping frames to the socket
/// 4. Feeds inbound text (or UTF-8 binary) frames to the hub
/// 5. Drops the client after the heartbeat timeout, on close, or on `cancel`
/// 6. Deregisters on exit
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    hub: Arc<Hub>,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let connection = hub.add_connection(send_tx);
    let conn_id = connection.id.clone();
    let _ = tracing::Span::current().record("conn_id", conn_id.as_str());

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let _ = connection.send_envelope(&Event::connection_established(conn_id.as_str()).stamp_now());

    // Outbound writer with periodic Ping frames.
    let writer_cancel = cancel.clone();
    let ping_every = config.heartbeat_interval();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(ping_every);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let heartbeat_conn = connection.clone();
    let heartbeat_cancel = cancel.clone();
    let (interval, timeout) = (config.heartbeat_interval(), config.heartbeat_timeout());
    drop(tokio::spawn(async move {
        let result = run_heartbeat(heartbeat_conn, interval, timeout, heartbeat_cancel.clone()).await;
        if result == HeartbeatResult::TimedOut {
            warn!(?timeout, "client unresponsive, disconnecting");
            heartbeat_cancel.cancel();
        }
    }));

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = cancel.cancelled() => {
                debug!("session cancelled");
                break;
            }
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                warn!(error = %e, "socket error");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        match msg {
            Message::Text(text) => {
                counter!(WS_MESSAGES_RECEIVED_TOTAL).increment(1);
                hub.handle_inbound(&conn_id, text.as_str());
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    counter!(WS_MESSAGES_RECEIVED_TOTAL).increment(1);
                    hub.handle_inbound(&conn_id, text);
                }
                Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Clean up
    cancel.cancel();
    let _ = hub.remove_connection(&conn_id);
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    info!(
        dropped = connection.drop_count(),
        duration_secs = connection_start.elapsed().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
}
