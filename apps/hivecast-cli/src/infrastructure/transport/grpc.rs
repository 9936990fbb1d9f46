//! gRPC Transport
//!
//! Relay access over the `hivecast.v1.RelayStream` service: a
//! server-streaming `Subscribe` for the receive path and a unary `Publish`.
//! There is no wire-level close handshake; ending the session drops the
//! response stream, which is how gRPC cancels a server stream. Frames the
//! relay already sent are still delivered during a short grace period
//! before the stream is dropped.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;

use super::proto::relay_stream_client::RelayStreamClient;
use super::proto::{PublishRequest, SubscribeRequest};
use crate::application::ports::{MessageTransport, TransportError, TransportEvent};
use crate::domain::message::RawFrame;
use crate::infrastructure::config::BearerToken;

/// Capacity of the event channel between stream task and session.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long to keep draining already-sent frames after cancellation.
const CANCEL_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// gRPC implementation of the relay transport.
pub struct GrpcTransport {
    url: String,
    topics: Vec<String>,
    client_id: String,
    token: Option<BearerToken>,
    client: Option<RelayStreamClient<Channel>>,
}

impl GrpcTransport {
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
            client: None,
        }
    }

    fn authorize<M>(&self, message: M) -> Result<tonic::Request<M>, TransportError> {
        let mut request = tonic::Request::new(message);
        if let Some(token) = &self.token {
            let value: MetadataValue<_> = format!("Bearer {}", token.expose())
                .parse()
                .map_err(|_| {
                    TransportError::SendFailed("bearer token is not metadata-safe".to_string())
                })?;
            request.metadata_mut().insert("authorization", value);
        }
        Ok(request)
    }
}

#[async_trait]
impl MessageTransport for GrpcTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let endpoint = Channel::from_shared(self.url.clone())
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::info!(url = %self.url, "grpc channel connected");
        self.client = Some(RelayStreamClient::new(channel));
        Ok(())
    }

    async fn subscribe(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let request = self.authorize(SubscribeRequest {
            topics: self.topics.clone(),
            client_id: self.client_id.clone(),
        })?;
        let client = self.client.as_mut().ok_or(TransportError::NotConnected)?;
        let mut stream = client
            .subscribe(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
            .into_inner();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        // Deliver frames the relay already sent, then drop
                        // the response stream, which cancels it server-side.
                        let _ = tokio::time::timeout(CANCEL_DRAIN_GRACE, async {
                            while let Ok(Some(frame)) = stream.message().await {
                                let raw = RawFrame {
                                    topic: frame.topic,
                                    message_id: frame.message_id,
                                    payload: frame.payload,
                                    received_at: Utc::now(),
                                };
                                if tx.send(TransportEvent::Frame(raw)).await.is_err() {
                                    break;
                                }
                            }
                        })
                        .await;
                        let _ = tx.send(TransportEvent::Closed).await;
                        break;
                    }
                    item = stream.message() => match item {
                        Ok(Some(frame)) => {
                            let raw = RawFrame {
                                topic: frame.topic,
                                message_id: frame.message_id,
                                payload: frame.payload,
                                received_at: Utc::now(),
                            };
                            let _ = tx.send(TransportEvent::Frame(raw)).await;
                        }
                        Ok(None) => {
                            tracing::info!("grpc stream closed by relay");
                            let _ = tx.send(TransportEvent::Closed).await;
                            break;
                        }
                        Err(status) => {
                            let _ = tx.send(TransportEvent::Error(status.to_string())).await;
                            break;
                        }
                    },
                }
            }
        });
        Ok(rx)
    }

    async fn publish(
        &mut self,
        topic: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let request = self.authorize(PublishRequest {
            topic: topic.to_string(),
            message_id: message_id.to_string(),
            payload: payload.to_vec(),
            client_id: self.client_id.clone(),
        })?;
        let client = self.client.as_mut().ok_or(TransportError::NotConnected)?;
        let response = client
            .publish(request)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?
            .into_inner();

        if response.accepted {
            Ok(())
        } else {
            Err(TransportError::PublishRejected(response.detail))
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.client = None;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
