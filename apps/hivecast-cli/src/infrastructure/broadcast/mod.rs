//! Delivery Fan-Out Hub
//!
//! Distributes received messages to every active sink using a tokio
//! broadcast channel. Each sink gets its own receiver and its own consumer
//! task, so one slow or failing sink never blocks the receive loop or its
//! siblings.
//!
//! End-of-session is signalled by dropping the last sender: every consumer
//! sees the channel close, finishes its in-flight delivery, and returns a
//! per-sink report.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::application::ports::DeliverySink;
use crate::domain::message::InboundMessage;

/// Central fan-out channel for one subscribe session.
#[derive(Debug)]
pub struct DeliveryHub {
    tx: broadcast::Sender<InboundMessage>,
}

impl DeliveryHub {
    /// Create a hub with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    /// Get a new receiver on the fan-out channel.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.tx.subscribe()
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Spawn a consumer task delivering every message to `sink`.
    ///
    /// The task runs until the channel closes and reports its delivery
    /// counts. Delivery failures are logged per message and isolated to the
    /// sink that failed.
    pub fn spawn_sink(&self, mut sink: Box<dyn DeliverySink>) -> JoinHandle<SinkReport> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            let mut report = SinkReport::new(sink.name());
            loop {
                match rx.recv().await {
                    Ok(message) => match sink.deliver(&message).await {
                        Ok(()) => report.delivered += 1,
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(
                                sink = sink.name(),
                                sequence = message.sequence,
                                error = %e,
                                "sink delivery failed"
                            );
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        report.lagged += skipped;
                        tracing::warn!(sink = sink.name(), skipped, "sink lagged, messages skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!(
                sink = report.name,
                delivered = report.delivered,
                failed = report.failed,
                "sink consumer finished"
            );
            report
        })
    }

    /// Consume the hub, yielding the last remaining sender.
    ///
    /// Whoever holds this sender controls end-of-stream for every sink
    /// consumer: dropping it closes the channel.
    #[must_use]
    pub fn into_sender(self) -> broadcast::Sender<InboundMessage> {
        self.tx
    }
}

/// Delivery counters for one finished sink consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    /// Sink name.
    pub name: &'static str,
    /// Messages delivered successfully.
    pub delivered: u64,
    /// Deliveries that failed.
    pub failed: u64,
    /// Messages skipped because the sink lagged the channel.
    pub lagged: u64,
}

impl SinkReport {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            delivered: 0,
            failed: 0,
            lagged: 0,
        }
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

    use super::*;
    use crate::application::ports::SinkError;

    struct CollectingSink {
        seen: Arc<Mutex<Vec<u64>>>,
    }

    #[async_trait]
    impl DeliverySink for CollectingSink {
        fn name(&self) -> &'static str {
            "collecting"
        }

        async fn deliver(&mut self, message: &InboundMessage) -> Result<(), SinkError> {
            self.seen.lock().push(message.sequence);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl DeliverySink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&mut self, _message: &InboundMessage) -> Result<(), SinkError> {
            Err(SinkError::DispatcherStopped)
        }
    }

    fn message(sequence: u64) -> InboundMessage {
        InboundMessage {
            sequence,
            topic: "alerts".to_string(),
            message_id: format!("m-{sequence}"),
            payload: vec![1, 2, 3],
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_sink_sees_every_message_in_order() {
        let hub = DeliveryHub::new(16);
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));
        let handle_a = hub.spawn_sink(Box::new(CollectingSink {
            seen: Arc::clone(&seen_a),
        }));
        let handle_b = hub.spawn_sink(Box::new(CollectingSink {
            seen: Arc::clone(&seen_b),
        }));

        let tx = hub.into_sender();
        for i in 1..=3 {
            tx.send(message(i)).unwrap();
        }
        drop(tx);

        let report_a = handle_a.await.unwrap();
        let report_b = handle_b.await.unwrap();
        assert_eq!(report_a.delivered, 3);
        assert_eq!(report_b.delivered, 3);
        assert_eq!(*seen_a.lock(), vec![1, 2, 3]);
        assert_eq!(*seen_b.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failing_sink_does_not_affect_sibling() {
        let hub = DeliveryHub::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let good = hub.spawn_sink(Box::new(CollectingSink {
            seen: Arc::clone(&seen),
        }));
        let bad = hub.spawn_sink(Box::new(FailingSink));

        let tx = hub.into_sender();
        tx.send(message(1)).unwrap();
        tx.send(message(2)).unwrap();
        drop(tx);

        let good_report = good.await.unwrap();
        let bad_report = bad.await.unwrap();
        assert_eq!(good_report.delivered, 2);
        assert_eq!(bad_report.delivered, 0);
        assert_eq!(bad_report.failed, 2);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn dropping_sender_ends_consumers() {
        let hub = DeliveryHub::new(16);
        let handle = hub.spawn_sink(Box::new(CollectingSink {
            seen: Arc::default(),
        }));
        assert_eq!(hub.receiver_count(), 1);

        drop(hub.into_sender());
        let report = handle.await.unwrap();
        assert_eq!(report.delivered, 0);
    }
}
