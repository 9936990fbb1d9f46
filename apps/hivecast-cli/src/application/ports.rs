//! Port Interfaces
//!
//! Contracts between the application services and the outside world,
//! following the hexagonal layering used across the codebase.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`MessageTransport`]: streaming subscription + publish over a concrete
//!   wire mechanism (WebSocket or gRPC)
//! - [`DeliverySink`]: one local consumer of received messages
//! - [`UsageStore`]: durable storage for the per-identity usage record
//! - [`Clock`]: wall-clock source, swappable in tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::message::{InboundMessage, RawFrame};
use crate::domain::quota::UsageRecord;

/// A transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection establishment failed. Terminal for the session.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation requires an established connection.
    #[error("transport is not connected")]
    NotConnected,

    /// A subscription stream is already consuming this connection.
    #[error("transport stream already taken")]
    StreamTaken,

    /// An outbound send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The peer rejected a publish.
    #[error("publish rejected by relay: {0}")]
    PublishRejected(String),
}

/// One item on a subscription stream.
///
/// The stream is unbounded in length and ends with exactly one terminal
/// event (`Closed` or `Error`), after which the channel closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A received message frame.
    Frame(RawFrame),
    /// The peer closed the stream cleanly.
    Closed,
    /// The stream ended with an unrecoverable read error.
    Error(String),
}

/// Streaming subscription and publish over one wire mechanism.
///
/// No automatic reconnection: when the stream ends, the session ends, and
/// retrying is the caller's responsibility.
#[async_trait]
pub trait MessageTransport: Send {
    /// Establish the connection.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Start streaming subscribed messages.
    ///
    /// Returns the receiving half of the frame sequence. Cancelling `cancel`
    /// is observed at the next blocking receive; the transport then attempts
    /// its protocol-appropriate close handshake and ends the stream.
    async fn subscribe(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Publish one message to a topic under a caller-assigned message id.
    async fn publish(
        &mut self,
        topic: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Tear down the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl MessageTransport for Box<dyn MessageTransport> {
    async fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect().await
    }

    async fn subscribe(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        (**self).subscribe(cancel).await
    }

    async fn publish(
        &mut self,
        topic: &str,
        message_id: &str,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        (**self).publish(topic, message_id, payload).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }
}

/// A sink-level delivery failure. Isolated per sink, never session-fatal.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing to the persistence file failed.
    #[error("persistence write failed: {0}")]
    PersistenceWrite(#[from] std::io::Error),

    /// Webhook enqueue target is gone.
    #[error("webhook dispatcher stopped")]
    DispatcherStopped,

    /// The webhook payload template failed to render for this message.
    #[error("webhook payload render failed: {0}")]
    Render(String),
}

/// One local consumer of received messages.
///
/// Sinks receive every message in transport order. A failed delivery must
/// not affect sibling sinks or the receive loop; the hub logs the error and
/// keeps going.
#[async_trait]
pub trait DeliverySink: Send {
    /// Short sink name for log events.
    fn name(&self) -> &'static str;

    /// Deliver one message.
    async fn deliver(&mut self, message: &InboundMessage) -> Result<(), SinkError>;
}

/// Durable storage for the usage record.
#[derive(Debug, thiserror::Error)]
pub enum UsageStoreError {
    /// Underlying I/O failure.
    #[error("usage store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document could not be encoded/decoded.
    #[error("usage store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Load/save access to the per-identity usage document.
///
/// Persistence is synchronous and best-effort; a failed save is logged by
/// the caller, never fatal.
pub trait UsageStore: Send + Sync {
    /// Load the stored record; `None` when absent or unreadable.
    fn load(&self) -> Result<Option<UsageRecord>, UsageStoreError>;

    /// Persist the record.
    fn save(&self, record: &UsageRecord) -> Result<(), UsageStoreError>;
}

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}
