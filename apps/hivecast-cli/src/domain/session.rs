//! Session Lifecycle State Machine
//!
//! One subscribe session moves through a fixed set of states; no state is
//! ever re-entered. A new session requires a fresh invocation.

/// Why a streaming session left the STREAMING state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// An OS interrupt/terminate signal was received.
    Signal,
    /// The peer closed the stream cleanly.
    PeerClosed,
    /// The transport surfaced an unrecoverable read error.
    TransportError,
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing started.
    Init,
    /// Transport connection in progress.
    Connecting,
    /// Receive loop running, frames flowing to sinks.
    Streaming,
    /// Interrupt received; close handshake in progress.
    ClosingBySignal,
    /// Peer ended the stream cleanly.
    ClosingByPeer,
    /// Transport error ended the stream.
    ClosingByError,
    /// Terminal state.
    Terminated,
}

impl SessionState {
    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Connecting)
                | (Self::Connecting, Self::Streaming)
                // Connect failure goes straight to the error-closing path.
                | (Self::Connecting, Self::ClosingByError)
                | (Self::Streaming, Self::ClosingBySignal)
                | (Self::Streaming, Self::ClosingByPeer)
                | (Self::Streaming, Self::ClosingByError)
                | (Self::ClosingBySignal, Self::Terminated)
                | (Self::ClosingByPeer, Self::Terminated)
                | (Self::ClosingByError, Self::Terminated)
        )
    }

    /// Map a close reason to its closing state.
    #[must_use]
    pub const fn closing_for(reason: CloseReason) -> Self {
        match reason {
            CloseReason::Signal => Self::ClosingBySignal,
            CloseReason::PeerClosed => Self::ClosingByPeer,
            CloseReason::TransportError => Self::ClosingByError,
        }
    }
}

/// An illegal state transition was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// State the machine was in.
    pub from: SessionState,
    /// State that was requested.
    pub to: SessionState,
}

/// Tracks the current session state and enforces the transition table.
#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
}

impl SessionStateMachine {
    /// Start a machine in `Init`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Init,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`, rejecting transitions outside the table.
    pub fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if self.state.can_transition_to(next) {
            tracing::debug!(from = ?self.state, to = ?next, "session state transition");
            self.state = next;
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.state,
                to: next,
            })
        }
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
