//! WebSocket Transport
//!
//! Relay access over a WebSocket connection. Text frames carry JSON
//! envelopes; frames that do not parse as an envelope are forwarded as raw
//! payloads rather than dropped. Pings are answered inline by the read task,
//! and the close handshake is initiated from this side when the session is
//! cancelled. A peer that never acknowledges the close only gets a grace
//! period; after that the socket is abandoned and the stream ends.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{MessageTransport, TransportError, TransportEvent};
use crate::domain::message::{RawFrame, RelayEnvelope};
use crate::infrastructure::config::BearerToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Capacity of the event channel between read task and session.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for the peer to acknowledge our close frame.
const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// WebSocket implementation of the relay transport.
pub struct WebSocketTransport {
    url: String,
    topics: Vec<String>,
    client_id: String,
    token: Option<BearerToken>,
    stream: Option<WsStream>,
}

impl WebSocketTransport {
    /// Create a transport for `url`, subscribing to `topics`.
    #[must_use]
    pub const fn new(
        url: String,
        topics: Vec<String>,
        client_id: String,
        token: Option<BearerToken>,
    ) -> Self {
        Self {
            url,
            topics,
            client_id,
            token,
            stream: None,
        }
    }
}

#[async_trait]
impl MessageTransport for WebSocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if let Some(token) = &self.token {
            let value = format!("Bearer {}", token.expose())
                .parse()
                .map_err(|_| {
                    TransportError::ConnectionFailed("bearer token is not header-safe".to_string())
                })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::info!(url = %self.url, status = %response.status(), "websocket connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn subscribe(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let stream = self.stream.take().ok_or(TransportError::NotConnected)?;
        let (mut write, read) = stream.split();

        let command = serde_json::json!({
            "action": "subscribe",
            "topics": self.topics,
            "client_id": self.client_id,
        });
        write
            .send(Message::Text(command.to_string().into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(read_loop(write, read, tx, cancel));
        Ok(rx)
    }

    async fn publish(
        &mut self,
        topic: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let envelope = serde_json::json!({
            "action": "publish",
            "topic": topic,
            "message_id": message_id,
            "message": String::from_utf8_lossy(payload),
            "client_id": self.client_id,
        });
        stream
            .send(Message::Text(envelope.to_string().into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // A subscribed stream is owned by the read task, which handles the
        // close handshake itself.
        if let Some(mut stream) = self.stream.take() {
            stream
                .close(None)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }
}

async fn read_loop(
    mut write: WsWriter,
    mut read: WsReader,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame send failed");
                }
                // Drain until the peer acknowledges the close so in-flight
                // frames still reach the session, but never wait on a peer
                // that has gone silent.
                let handshake = tokio::time::timeout(CLOSE_GRACE_PERIOD, async {
                    while let Some(msg) = read.next().await {
                        match msg {
                            Ok(Message::Text(text)) => {
                                forward_text(&tx, text.as_str()).await;
                            }
                            Ok(Message::Close(_)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                })
                .await;
                if handshake.is_err() {
                    tracing::warn!("close handshake timed out, abandoning socket");
                }
                let _ = tx.send(TransportEvent::Closed).await;
                break;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    forward_text(&tx, text.as_str()).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let frame = RawFrame {
                        topic: String::new(),
                        message_id: String::new(),
                        payload: bytes.to_vec(),
                        received_at: Utc::now(),
                    };
                    let _ = tx.send(TransportEvent::Frame(frame)).await;
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        tracing::debug!(error = %e, "pong send failed");
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("websocket closed by peer");
                    let _ = tx.send(TransportEvent::Closed).await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = tx.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            },
        }
    }
}

async fn forward_text(tx: &mpsc::Sender<TransportEvent>, text: &str) {
    let frame = frame_from_text(text);
    let _ = tx.send(TransportEvent::Frame(frame)).await;
}

/// Decode a text frame: relay envelope when it parses, raw payload otherwise.
fn frame_from_text(text: &str) -> RawFrame {
    let received_at = Utc::now();
    match RelayEnvelope::decode(text) {
        Ok(envelope) => envelope.into_frame(received_at),
        Err(_) => RawFrame {
            topic: String::new(),
            message_id: String::new(),
            payload: text.as_bytes().to_vec(),
            received_at,
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
