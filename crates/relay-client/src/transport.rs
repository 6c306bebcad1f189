//! Socket abstraction between the supervisor and the network.
//!
//! A [`Connector`] opens a [`Socket`]: a pair of channels carrying outbound
//! frames in and [`SocketEvent`]s out. The supervisor never touches the
//! underlying stream, which keeps reconnect logic testable without a server.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Frames the supervisor asks the socket to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame.
    Text(String),
    /// Close the socket.
    Close,
}

/// What the socket reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame (or UTF-8 binary frame) arrived.
    Message(String),
    /// A transport error; a `Closed` event follows.
    Error(String),
    /// The socket is gone.
    Closed,
}

/// An open socket as seen by the supervisor.
#[derive(Debug)]
pub struct Socket {
    /// Write side.
    pub outbound: mpsc::UnboundedSender<Outbound>,
    /// Read side. Ends with [`SocketEvent::Closed`].
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Opens sockets to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a socket. Resolves once the handshake completes.
    async fn connect(&self, url: &str) -> Result<Socket, ClientError>;
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Socket, ClientError> {
        let (mut ws, response) = connect_async(url).await?;
        debug!(url, status = %response.status(), "websocket handshake complete");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<SocketEvent>();

        drop(tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = out_rx.recv() => match cmd {
                        Some(Outbound::Text(text)) => {
                            if let Err(e) = ws.send(Message::text(text)).await {
                                let _ = in_tx.send(SocketEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        Some(Outbound::Close) | None => {
                            let _ = ws.close(None).await;
                            break;
                        }
                    },
                    frame = ws.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(SocketEvent::Message(text.as_str().to_owned()));
                        }
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => {
                                let _ = in_tx.send(SocketEvent::Message(text.to_owned()));
                            }
                            Err(_) => debug!(len = data.len(), "ignoring non-UTF8 binary frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket read failed");
                            let _ = in_tx.send(SocketEvent::Error(e.to_string()));
                            break;
                        }
                    },
                }
            }
            let _ = in_tx.send(SocketEvent::Closed);
        }));

        Ok(Socket {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
