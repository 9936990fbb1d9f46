//! Publish Service
//!
//! Orchestrates one publish: limiter check, transport send, then usage
//! accounting. The transport send only happens after the limiter admits the
//! message, so a rejected publish never touches the wire.

use std::sync::Arc;

use uuid::Uuid;

use crate::application::limiter::RateLimiter;
use crate::application::ports::{MessageTransport, TransportError};
use crate::domain::quota::LimitError;

/// A publish attempt failed before or at the transport.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The client-side limiter rejected the message.
    #[error(transparent)]
    Limit(#[from] LimitError),

    /// The transport send failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Client-assigned message identifier sent with the payload.
    pub message_id: String,
    /// Payload size in bytes, as counted against the quota.
    pub size: u64,
}

/// Publishes messages through a connected transport under rate limits.
pub struct Publisher<T: MessageTransport> {
    transport: T,
    limiter: Arc<RateLimiter>,
}

impl<T: MessageTransport> Publisher<T> {
    /// Wrap an already-connected transport.
    pub const fn new(transport: T, limiter: Arc<RateLimiter>) -> Self {
        Self { transport, limiter }
    }

    /// Publish `payload` to `topic`.
    ///
    /// Assigns a fresh UUID message id. On transport success the publish is
    /// recorded against the quota; a failed usage save is logged, never
    /// surfaced, because the message is already on the wire.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<PublishOutcome, PublishError> {
        let size = payload.len() as u64;
        self.limiter.check_publish_allowed(size)?;

        let message_id = Uuid::new_v4().to_string();
        self.transport.publish(topic, &message_id, payload).await?;

        if let Err(e) = self.limiter.record_publish(size) {
            tracing::warn!(error = %e, %message_id, "publish succeeded but usage save failed");
        }
        tracing::info!(%topic, %message_id, size, "message published");

        Ok(PublishOutcome { message_id, size })
    }

    /// Give the transport back, e.g. to close it.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::application::ports::{TransportEvent, UsageStore, UsageStoreError};
    use crate::domain::claims::TokenClaims;
    use crate::domain::quota::UsageRecord;
    use crate::infrastructure::clock::ManualClock;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
        fail_sends: bool,
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn subscribe(
            &mut self,
            _cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
            Err(TransportError::NotConnected)
        }

        async fn publish(
            &mut self,
            topic: &str,
            message_id: &str,
            payload: &[u8],
        ) -> Result<(), TransportError> {
            if self.fail_sends {
                return Err(TransportError::SendFailed("wire down".to_string()));
            }
            self.sent.lock().push((
                topic.to_string(),
                message_id.to_string(),
                payload.to_vec(),
            ));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct NullStore;

    impl UsageStore for NullStore {
        fn load(&self) -> Result<Option<UsageRecord>, UsageStoreError> {
            Ok(None)
        }

        fn save(&self, _record: &UsageRecord) -> Result<(), UsageStoreError> {
            Ok(())
        }
    }

    fn limiter(claims: TokenClaims) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(
            &claims,
            Box::new(NullStore),
            Arc::new(ManualClock::new(Utc::now())),
        ))
    }

    fn active_claims() -> TokenClaims {
        TokenClaims {
            is_active: true,
            ..TokenClaims::default()
        }
    }

    #[tokio::test]
    async fn publish_sends_and_records() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = RecordingTransport {
            sent: Arc::clone(&sent),
            fail_sends: false,
        };
        let limiter = limiter(active_claims());
        let mut publisher = Publisher::new(transport, Arc::clone(&limiter));

        let outcome = publisher.publish("alerts", b"hello").await.unwrap();
        assert_eq!(outcome.size, 5);
        assert!(!outcome.message_id.is_empty());

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alerts");
        assert_eq!(sent[0].1, outcome.message_id);
        assert_eq!(sent[0].2, b"hello");
        drop(sent);

        assert_eq!(limiter.usage_stats().publish_count, 1);
        assert_eq!(limiter.usage_stats().bytes_published, 5);
    }

    #[tokio::test]
    async fn rejected_publish_never_reaches_transport() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = RecordingTransport {
            sent: Arc::clone(&sent),
            fail_sends: false,
        };
        let claims = TokenClaims {
            is_active: false,
            ..TokenClaims::default()
        };
        let mut publisher = Publisher::new(transport, limiter(claims));

        let err = publisher.publish("alerts", b"hello").await.unwrap_err();
        assert!(matches!(err, PublishError::Limit(LimitError::AccountInactive)));
        assert!(sent.lock().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_does_not_record_usage() {
        let transport = RecordingTransport {
            sent: Arc::default(),
            fail_sends: true,
        };
        let limiter = limiter(active_claims());
        let mut publisher = Publisher::new(transport, Arc::clone(&limiter));

        let err = publisher.publish("alerts", b"hello").await.unwrap_err();
        assert!(matches!(err, PublishError::Transport(_)));
        assert_eq!(limiter.usage_stats().publish_count, 0);
        assert_eq!(limiter.usage_stats().bytes_published, 0);
    }
}
