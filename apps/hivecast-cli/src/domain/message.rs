//! Subscription Message Types
//!
//! Value types flowing through the delivery pipeline: the raw frame produced
//! by a transport, the sequenced message fanned out to sinks, and the JSON
//! envelope used by the relay wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw frame as produced by a transport, before sequencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Topic the message was published to; empty if the frame carried none.
    pub topic: String,
    /// Relay-assigned message identifier; empty if the frame carried none.
    pub message_id: String,
    /// Message body bytes.
    pub payload: Vec<u8>,
    /// When this client received the frame.
    pub received_at: DateTime<Utc>,
}

/// A received message fanned out to every active sink.
///
/// Created once per frame with a monotonic per-session sequence number and
/// delivered to sinks by value; sinks never mutate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Monotonic per-session sequence number, starting at 1.
    pub sequence: u64,
    /// Topic the message was published to.
    pub topic: String,
    /// Relay-assigned message identifier.
    pub message_id: String,
    /// Message body bytes.
    pub payload: Vec<u8>,
    /// When this client received the frame.
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Sequence a raw frame into a deliverable message.
    #[must_use]
    pub fn from_frame(frame: RawFrame, sequence: u64) -> Self {
        Self {
            sequence,
            topic: frame.topic,
            message_id: frame.message_id,
            payload: frame.payload,
            received_at: frame.received_at,
        }
    }

    /// Message body as UTF-8, with invalid bytes replaced.
    #[must_use]
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// JSON envelope carried on the relay's text-frame wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    /// Identifier of the relay node that sourced the message.
    #[serde(default)]
    pub source_node_id: String,
    /// Topic the message was published to.
    pub topic: String,
    /// Relay-assigned message identifier.
    #[serde(default)]
    pub message_id: String,
    /// Message body.
    pub message: String,
}

impl RelayEnvelope {
    /// Decode an envelope from a text frame.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error if the frame is not an envelope;
    /// callers treat that as a raw payload rather than a failure.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Convert the envelope into a raw frame stamped at `received_at`.
    #[must_use]
    pub fn into_frame(self, received_at: DateTime<Utc>) -> RawFrame {
        RawFrame {
            topic: self.topic,
            message_id: self.message_id,
            payload: self.message.into_bytes(),
            received_at,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
