//! WebSocket Transport Integration Tests
//!
//! Spins up a local WebSocket relay and checks the subscribe handshake,
//! frame decoding, peer close, and the client-initiated close handshake.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use hivecast_cli::{MessageTransport, TransportEvent, WebSocketTransport};

/// What the test relay observed from the client.
#[derive(Debug)]
enum ServerEvent {
    Subscribe(serde_json::Value),
    CloseFrame,
}

/// Start a relay that sends `frames` after the subscribe command, then
/// follows `close_after_frames` or waits for the client to close.
fn spawn_relay(
    frames: Vec<String>,
    close_after_frames: bool,
) -> (String, mpsc::UnboundedReceiver<ServerEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let listener = TcpListener::from_std(listener).unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        // First inbound message is the subscribe command.
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let command: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            events_tx.send(ServerEvent::Subscribe(command)).unwrap();
        }

        for frame in frames {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }

        if close_after_frames {
            ws.send(Message::Close(None)).await.unwrap();
            // Drain until the close handshake completes.
            while let Some(Ok(_)) = ws.next().await {}
        } else {
            // Wait for the client to start the close handshake.
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, Message::Close(_)) {
                    events_tx.send(ServerEvent::CloseFrame).unwrap();
                    break;
                }
            }
        }
    });

    (format!("ws://{addr}"), events_rx)
}

/// Start a relay that sends `frames` after the subscribe command and then
/// goes permanently silent: it neither reads nor answers the close
/// handshake, but keeps the socket open.
fn spawn_silent_relay(frames: Vec<String>) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let listener = TcpListener::from_std(listener).unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let _ = ws.next().await;
        for frame in frames {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        std::future::pending::<()>().await;
    });

    format!("ws://{addr}")
}

fn envelope(topic: &str, id: &str, message: &str) -> String {
    serde_json::json!({
        "source_node_id": "relay-test",
        "topic": topic,
        "message_id": id,
        "message": message,
    })
    .to_string()
}

async fn collect_until_terminal(
    rx: &mut mpsc::Receiver<TransportEvent>,
) -> (Vec<TransportEvent>, TransportEvent) {
    let mut frames = Vec::new();
    loop {
        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            TransportEvent::Frame(_) => frames.push(event),
            terminal => return (frames, terminal),
        }
    }
}

#[tokio::test]
async fn subscribe_streams_frames_then_peer_close() {
    let (url, mut server_events) = spawn_relay(
        vec![
            envelope("alerts", "m-1", "first"),
            envelope("alerts", "m-2", "second"),
            "unstructured text".to_string(),
        ],
        true,
    );

    let mut transport = WebSocketTransport::new(url, vec!["alerts".to_string()], "c1".to_string(), None);
    transport.connect().await.unwrap();
    let mut rx = transport.subscribe(CancellationToken::new()).await.unwrap();

    let (frames, terminal) = collect_until_terminal(&mut rx).await;
    assert_eq!(frames.len(), 3);
    assert_eq!(terminal, TransportEvent::Closed);

    // Typed envelopes decode; unstructured text survives as a raw payload.
    let TransportEvent::Frame(first) = &frames[0] else {
        unreachable!()
    };
    assert_eq!(first.topic, "alerts");
    assert_eq!(first.message_id, "m-1");
    assert_eq!(first.payload, b"first");
    let TransportEvent::Frame(raw) = &frames[2] else {
        unreachable!()
    };
    assert!(raw.topic.is_empty());
    assert_eq!(raw.payload, b"unstructured text");

    // The relay saw the subscribe command with our topics.
    let ServerEvent::Subscribe(command) = server_events.recv().await.unwrap() else {
        panic!("expected subscribe command first");
    };
    assert_eq!(command["action"], "subscribe");
    assert_eq!(command["topics"][0], "alerts");
    assert_eq!(command["client_id"], "c1");
}

#[tokio::test]
async fn cancel_sends_close_frame_and_ends_stream() {
    let (url, mut server_events) = spawn_relay(vec![envelope("alerts", "m-1", "only")], false);

    let mut transport = WebSocketTransport::new(url, vec!["alerts".to_string()], "c1".to_string(), None);
    transport.connect().await.unwrap();

    let cancel = CancellationToken::new();
    let mut rx = transport.subscribe(cancel.clone()).await.unwrap();

    // First frame proves the stream is live before we cancel.
    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, TransportEvent::Frame(_)));

    cancel.cancel();

    // Stream ends with a clean close and the relay observed our close frame.
    let (_, terminal) = collect_until_terminal(&mut rx).await;
    assert_eq!(terminal, TransportEvent::Closed);

    let saw_close = timeout(Duration::from_secs(5), async {
        loop {
            match server_events.recv().await {
                Some(ServerEvent::CloseFrame) => break true,
                Some(ServerEvent::Subscribe(_)) => {}
                None => break false,
            }
        }
    })
    .await
    .unwrap();
    assert!(saw_close);
}

#[tokio::test]
async fn silent_peer_cannot_block_cancellation() {
    let url = spawn_silent_relay(vec![envelope("alerts", "m-1", "only")]);

    let mut transport = WebSocketTransport::new(url, vec!["alerts".to_string()], "c1".to_string(), None);
    transport.connect().await.unwrap();

    let cancel = CancellationToken::new();
    let mut rx = transport.subscribe(cancel.clone()).await.unwrap();

    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, TransportEvent::Frame(_)));

    // The relay never answers the close frame; the stream must still end
    // once the close grace period expires.
    cancel.cancel();
    let (frames, terminal) = collect_until_terminal(&mut rx).await;
    assert!(frames.is_empty());
    assert_eq!(terminal, TransportEvent::Closed);
}

#[tokio::test]
async fn connect_failure_is_reported() {
    // Nothing is listening on this port.
    let mut transport = WebSocketTransport::new(
        "ws://127.0.0.1:1/ws".to_string(),
        vec!["alerts".to_string()],
        "c1".to_string(),
        None,
    );
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(
        err,
        hivecast_cli::TransportError::ConnectionFailed(_)
    ));
}
