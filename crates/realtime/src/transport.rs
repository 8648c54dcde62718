//! Transport seam between the connection state machine and the socket.
//!
//! A [`Connector`] opens one transport and returns a [`TransportHandle`]:
//! an outbound channel of [`Outbound`] commands and an inbound channel of
//! [`TransportEvent`]s. The client never touches the socket directly, so
//! alternative transports (and scripted ones in tests) plug in by
//! implementing [`Connector`] and driving the [`TransportPeer`] end.
//!
//! [`WsConnector`] is the production implementation over
//! `tokio-tungstenite`.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::RealtimeError;

/// Close code for a deliberate, user-initiated shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close frame arrived without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// The connection dropped without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Why a transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn normal() -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: String::new(),
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
        }
    }

    /// Only a normal closure suppresses automatic reconnection.
    pub fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

/// Commands from the client to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one text frame.
    Text(String),
    /// Send a close frame and stop writing.
    Close(CloseReason),
}

/// Events from the transport to the client, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame.
    Frame(String),
    /// The transport closed; no further events follow.
    Closed(CloseReason),
}

/// Client-side ends of an open transport.
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Transport-side ends matching a [`TransportHandle`].
pub struct TransportPeer {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub commands: mpsc::UnboundedReceiver<Outbound>,
}

impl TransportHandle {
    /// Create a connected handle/peer pair.
    pub fn pair() -> (TransportHandle, TransportPeer) {
        let (outbound, commands) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::unbounded_channel();
        (
            TransportHandle { outbound, inbound },
            TransportPeer { events, commands },
        )
    }
}

impl TransportPeer {
    /// Deliver a text frame to the client. Returns `false` once the client
    /// has dropped its end.
    pub fn push_frame(&self, text: impl Into<String>) -> bool {
        self.events
            .send(TransportEvent::Frame(text.into()))
            .is_ok()
    }

    /// Report the transport closed with `code`.
    pub fn close(&self, code: u16) -> bool {
        self.events
            .send(TransportEvent::Closed(CloseReason {
                code,
                reason: String::new(),
            }))
            .is_ok()
    }
}

/// Opens transports for the realtime client.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a transport to `url`.
    ///
    /// Errors here are establishment failures; anything that goes wrong
    /// afterwards is reported as [`TransportEvent::Closed`].
    async fn open(&self, url: &str) -> Result<TransportHandle, RealtimeError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] over `tokio-tungstenite`.
///
/// Each open spawns a writer task (outbound channel -> socket sink) and a
/// reader task (socket stream -> inbound channel).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<TransportHandle, RealtimeError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| RealtimeError::Connection(format!("Failed to connect to {url}: {e}")))?;

        let (sink, stream) = ws_stream.split();
        let (handle, peer) = TransportHandle::pair();

        tokio::spawn(write_loop(sink, peer.commands));
        tokio::spawn(read_loop(stream, peer.events));

        Ok(handle)
    }
}

/// Forward outbound commands to the socket until closed.
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            Outbound::Close(reason) => {
                let frame = CloseFrame {
                    code: CloseCode::from(reason.code),
                    reason: reason.reason.into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "Failed to send close frame");
                }
                break;
            }
        }
    }

    let _ = sink.close().await;
}

/// Forward inbound frames to the client, ending with exactly one
/// [`TransportEvent::Closed`].
async fn read_loop(mut stream: SplitStream<WsStream>, events: mpsc::UnboundedSender<TransportEvent>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if events.send(TransportEvent::Frame(text)).is_err() {
                    // Client discarded this transport.
                    return;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!("Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                break match frame {
                    Some(frame) => CloseReason {
                        code: u16::from(frame.code),
                        reason: frame.reason.into_owned(),
                    },
                    None => CloseReason {
                        code: CLOSE_NO_STATUS,
                        reason: String::new(),
                    },
                };
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => break CloseReason::abnormal(e.to_string()),
            None => break CloseReason::abnormal("stream ended without close frame"),
        }
    };

    let _ = events.send(TransportEvent::Closed(reason));
}
