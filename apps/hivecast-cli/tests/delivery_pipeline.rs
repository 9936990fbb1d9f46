//! Delivery Pipeline Integration Tests
//!
//! Runs a full subscribe session over an in-process transport and checks
//! fan-out ordering, sink isolation, file persistence, and shutdown
//! behavior.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use hivecast_cli::{
    CloseReason, DeliveryHub, FileSink, InboundMessage, MessageTransport, RawFrame, SinkError,
    SubscribeSession, TransportError, TransportEvent,
};

/// Transport streaming frames pushed in by the test.
struct PushTransport {
    events: Option<mpsc::Receiver<TransportEvent>>,
}

impl PushTransport {
    fn new() -> (mpsc::Sender<TransportEvent>, Self) {
        let (tx, rx) = mpsc::channel(64);
        (tx, Self { events: Some(rx) })
    }
}

#[async_trait]
impl MessageTransport for PushTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn subscribe(
        &mut self,
        _cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        self.events.take().ok_or(TransportError::StreamTaken)
    }

    async fn publish(
        &mut self,
        _topic: &str,
        _message_id: &str,
        _payload: &[u8],
    ) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct CollectingSink {
    name: &'static str,
    seen: Arc<Mutex<Vec<InboundMessage>>>,
}

#[async_trait]
impl hivecast_cli::DeliverySink for CollectingSink {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn deliver(&mut self, message: &InboundMessage) -> Result<(), SinkError> {
        self.seen.lock().push(message.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl hivecast_cli::DeliverySink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn deliver(&mut self, _message: &InboundMessage) -> Result<(), SinkError> {
        Err(SinkError::DispatcherStopped)
    }
}

fn frame(id: u64) -> TransportEvent {
    TransportEvent::Frame(RawFrame {
        topic: "alerts".to_string(),
        message_id: format!("m-{id}"),
        payload: format!("payload-{id}").into_bytes(),
        received_at: Utc::now(),
    })
}

#[tokio::test]
async fn frames_reach_every_sink_in_transport_order() {
    let (events, transport) = PushTransport::new();
    let hub = DeliveryHub::new(64);

    let seen_a = Arc::new(Mutex::new(Vec::new()));
    let seen_b = Arc::new(Mutex::new(Vec::new()));
    let handle_a = hub.spawn_sink(Box::new(CollectingSink {
        name: "a",
        seen: Arc::clone(&seen_a),
    }));
    let handle_b = hub.spawn_sink(Box::new(CollectingSink {
        name: "b",
        seen: Arc::clone(&seen_b),
    }));

    let session = SubscribeSession::new(transport, hub.into_sender());
    let session_handle = tokio::spawn(session.run(CancellationToken::new()));

    for i in 1..=5 {
        events.send(frame(i)).await.unwrap();
    }
    events.send(TransportEvent::Closed).await.unwrap();
    drop(events);

    let outcome = timeout(Duration::from_secs(5), session_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome.reason, CloseReason::PeerClosed);
    assert_eq!(outcome.frames_delivered, 5);

    let report_a = handle_a.await.unwrap();
    let report_b = handle_b.await.unwrap();
    assert_eq!(report_a.delivered, 5);
    assert_eq!(report_b.delivered, 5);

    let sequences: Vec<u64> = seen_a.lock().iter().map(|m| m.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    let ids: Vec<String> = seen_b.lock().iter().map(|m| m.message_id.clone()).collect();
    assert_eq!(ids, vec!["m-1", "m-2", "m-3", "m-4", "m-5"]);
}

#[tokio::test]
async fn failing_sink_never_blocks_the_others() {
    let (events, transport) = PushTransport::new();
    let hub = DeliveryHub::new(64);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let good = hub.spawn_sink(Box::new(CollectingSink {
        name: "good",
        seen: Arc::clone(&seen),
    }));
    let bad = hub.spawn_sink(Box::new(FailingSink));

    let session = SubscribeSession::new(transport, hub.into_sender());
    let session_handle = tokio::spawn(session.run(CancellationToken::new()));

    for i in 1..=3 {
        events.send(frame(i)).await.unwrap();
    }
    events.send(TransportEvent::Closed).await.unwrap();
    drop(events);

    session_handle.await.unwrap().unwrap();
    assert_eq!(good.await.unwrap().delivered, 3);
    let bad_report = bad.await.unwrap();
    assert_eq!(bad_report.failed, 3);
    assert_eq!(seen.lock().len(), 3);
}

#[tokio::test]
async fn interrupt_terminates_and_flushes_sinks() {
    let (events, transport) = PushTransport::new();
    let hub = DeliveryHub::new(64);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_handle = hub.spawn_sink(Box::new(CollectingSink {
        name: "console",
        seen: Arc::clone(&seen),
    }));

    let interrupt = CancellationToken::new();
    let session = SubscribeSession::new(transport, hub.into_sender());
    let session_handle = tokio::spawn(session.run(interrupt.clone()));

    events.send(frame(1)).await.unwrap();
    events.send(frame(2)).await.unwrap();

    // Wait until both frames made it through the fan-out before signalling.
    timeout(Duration::from_secs(5), async {
        while seen.lock().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    interrupt.cancel();
    // The transport task observes the cancel and ends the stream.
    events.send(TransportEvent::Closed).await.unwrap();
    drop(events);

    let outcome = timeout(Duration::from_secs(5), session_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome.reason, CloseReason::Signal);

    let report = sink_handle.await.unwrap();
    assert_eq!(report.delivered, 2);
}

#[tokio::test]
async fn interrupt_terminates_even_when_transport_stalls() {
    let (events, transport) = PushTransport::new();
    let hub = DeliveryHub::new(64);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_handle = hub.spawn_sink(Box::new(CollectingSink {
        name: "console",
        seen: Arc::clone(&seen),
    }));

    let interrupt = CancellationToken::new();
    let session = SubscribeSession::new(transport, hub.into_sender());
    let session_handle = tokio::spawn(session.run(interrupt.clone()));

    events.send(frame(1)).await.unwrap();
    timeout(Duration::from_secs(5), async {
        while seen.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // The stream never ends: no Closed event, sender stays alive. The
    // session must still terminate within its drain bound.
    interrupt.cancel();
    let outcome = timeout(Duration::from_secs(10), session_handle)
        .await
        .expect("session must terminate after interrupt even with a stalled stream")
        .unwrap()
        .unwrap();
    assert_eq!(outcome.reason, CloseReason::Signal);
    assert_eq!(outcome.frames_delivered, 1);

    assert_eq!(sink_handle.await.unwrap().delivered, 1);
    drop(events);
}

#[tokio::test]
async fn transport_error_still_closes_sinks_cleanly() {
    let (events, transport) = PushTransport::new();
    let hub = DeliveryHub::new(64);
    let sink_handle = hub.spawn_sink(Box::new(CollectingSink {
        name: "console",
        seen: Arc::default(),
    }));

    let session = SubscribeSession::new(transport, hub.into_sender());
    let session_handle = tokio::spawn(session.run(CancellationToken::new()));

    events.send(frame(1)).await.unwrap();
    events
        .send(TransportEvent::Error("connection reset".to_string()))
        .await
        .unwrap();
    drop(events);

    let outcome = session_handle.await.unwrap().unwrap();
    assert_eq!(outcome.reason, CloseReason::TransportError);
    assert_eq!(sink_handle.await.unwrap().delivered, 1);
}

#[tokio::test]
async fn file_sink_persists_the_full_session() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.log");

    let (events, transport) = PushTransport::new();
    let hub = DeliveryHub::new(64);
    let sink = FileSink::open(&path).await.unwrap();
    let sink_handle = hub.spawn_sink(Box::new(sink));

    let session = SubscribeSession::new(transport, hub.into_sender());
    let session_handle = tokio::spawn(session.run(CancellationToken::new()));

    for i in 1..=4 {
        events.send(frame(i)).await.unwrap();
    }
    events.send(TransportEvent::Closed).await.unwrap();
    drop(events);

    session_handle.await.unwrap().unwrap();
    assert_eq!(sink_handle.await.unwrap().delivered, 4);

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].ends_with("payload-1"));
    assert!(lines[3].ends_with("payload-4"));
}
