//! Subscribe Session Runner
//!
//! Drives one streaming subscription from connect to terminate: receives
//! frames from the transport, sequences them, and fans them out to the
//! delivery channel while racing an external interrupt signal.
//!
//! ## Shutdown
//!
//! The runner owns a child cancellation token handed to the transport. On
//! interrupt it flips the session to the signal-closing state, cancels the
//! token (the transport performs its close handshake), and keeps draining
//! frames already in flight until the stream ends or the drain deadline
//! passes. The deadline guarantees an interrupt always terminates the
//! session even when the transport never ends its stream. The delivery
//! sender is dropped when the runner returns, which is what lets sink
//! consumers observe end-of-stream.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{MessageTransport, TransportError, TransportEvent};
use crate::domain::message::InboundMessage;
use crate::domain::session::{CloseReason, InvalidTransition, SessionState, SessionStateMachine};

/// Upper bound on draining in-flight frames after an interrupt.
const INTERRUPT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A subscribe session failed to start or broke its lifecycle contract.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Connecting or subscribing failed; the session never streamed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Internal lifecycle violation.
    #[error(transparent)]
    State(#[from] InvalidTransition),
}

/// How a completed session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Why the stream ended.
    pub reason: CloseReason,
    /// Frames fanned out to the delivery channel.
    pub frames_delivered: u64,
}

/// Runs one subscription over a transport, fanning frames out to sinks.
pub struct SubscribeSession<T: MessageTransport> {
    transport: T,
    delivery_tx: broadcast::Sender<InboundMessage>,
    machine: SessionStateMachine,
}

impl<T: MessageTransport> SubscribeSession<T> {
    /// Build a session over an unconnected transport.
    pub fn new(transport: T, delivery_tx: broadcast::Sender<InboundMessage>) -> Self {
        Self {
            transport,
            delivery_tx,
            machine: SessionStateMachine::new(),
        }
    }

    /// Run the session to completion.
    ///
    /// Cancelling `interrupt` requests a graceful close. Returns the close
    /// reason and delivery count once the stream has fully ended; connect or
    /// subscribe failures are terminal and returned as errors.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] when the connection or subscription could
    /// not be established. Stream errors after streaming began are not
    /// errors here; they end the session with
    /// [`CloseReason::TransportError`].
    pub async fn run(mut self, interrupt: CancellationToken) -> Result<SessionOutcome, SessionError> {
        self.machine.transition(SessionState::Connecting)?;

        let cancel = CancellationToken::new();
        let mut events = match self.start_streaming(&cancel).await {
            Ok(events) => events,
            Err(e) => {
                self.machine.transition(SessionState::ClosingByError)?;
                self.machine.transition(SessionState::Terminated)?;
                return Err(e.into());
            }
        };
        self.machine.transition(SessionState::Streaming)?;
        tracing::info!("subscription streaming");

        let mut sequence: u64 = 0;
        let reason = loop {
            tokio::select! {
                () = interrupt.cancelled() => {
                    tracing::info!("interrupt received, closing subscription");
                    cancel.cancel();
                    // Deliver whatever was already in flight before the
                    // transport finishes its close handshake, but terminate
                    // within a bound even if the stream never ends.
                    let drained = tokio::time::timeout(INTERRUPT_DRAIN_TIMEOUT, async {
                        while let Some(event) = events.recv().await {
                            match event {
                                TransportEvent::Frame(frame) => {
                                    sequence += 1;
                                    self.fan_out(InboundMessage::from_frame(frame, sequence));
                                }
                                TransportEvent::Closed | TransportEvent::Error(_) => break,
                            }
                        }
                    })
                    .await;
                    if drained.is_err() {
                        tracing::warn!("transport did not end its stream in time, terminating anyway");
                    }
                    break CloseReason::Signal;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Frame(frame)) => {
                        sequence += 1;
                        self.fan_out(InboundMessage::from_frame(frame, sequence));
                    }
                    Some(TransportEvent::Closed) | None => break CloseReason::PeerClosed,
                    Some(TransportEvent::Error(e)) => {
                        tracing::warn!(error = %e, "stream ended with transport error");
                        break CloseReason::TransportError;
                    }
                },
            }
        };

        self.machine.transition(SessionState::closing_for(reason))?;
        if let Err(e) = self.transport.close().await {
            tracing::warn!(error = %e, "transport close failed");
        }
        self.machine.transition(SessionState::Terminated)?;
        tracing::info!(?reason, frames = sequence, "session terminated");

        Ok(SessionOutcome {
            reason,
            frames_delivered: sequence,
        })
    }

    async fn start_streaming(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<tokio::sync::mpsc::Receiver<TransportEvent>, TransportError> {
        self.transport.connect().await?;
        self.transport.subscribe(cancel.clone()).await
    }

    fn fan_out(&self, message: InboundMessage) {
        // No receivers just means every sink is already gone; keep counting.
        if self.delivery_tx.send(message).is_err() {
            tracing::debug!("no active delivery sinks");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
