#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Hivecast CLI - Pub/Sub Relay Client
//!
//! A command-line client for a pub/sub relay network: publish messages to
//! topics and stream subscribed topics to local sinks (console, file,
//! webhook), with client-side rate limiting backed by durable local usage
//! state.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `claims`: credential claims and the derived rate-limit policy
//!   - `quota`: usage accounting and window math
//!   - `message`: message frames and the relay wire envelope
//!   - `session`: session lifecycle state machine
//!
//! - **Application**: Services and port definitions
//!   - `limiter`: publish admission and usage recording
//!   - `publisher`: rate-limited publish orchestration
//!   - `session`: subscribe session runner
//!
//! - **Infrastructure**: Adapters
//!   - `transport`: WebSocket and gRPC relay transports
//!   - `broadcast`: fan-out of received messages to sinks
//!   - `sinks`: console, file, and webhook delivery
//!   - `usage`: JSON usage document persistence
//!
//! # Data Flow
//!
//! ```text
//! Relay WS/gRPC ───► Session ───► Fan-out ──┬──► Console
//!                    Runner      Channel    ├──► File
//!                                           └──► Webhook Queue ──► HTTP
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core pub/sub client types with no external integrations.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::claims::{RateLimitPolicy, TokenClaims};
pub use domain::message::{InboundMessage, RawFrame, RelayEnvelope};
pub use domain::quota::{LimitError, UsageRecord, UsageStats};
pub use domain::session::{CloseReason, SessionState};

// Application services
pub use application::limiter::RateLimiter;
pub use application::ports::{
    DeliverySink, MessageTransport, SinkError, TransportError, TransportEvent, UsageStore,
};
pub use application::publisher::{PublishError, PublishOutcome, Publisher};
pub use application::session::{SessionError, SessionOutcome, SubscribeSession};

// Infrastructure config
pub use infrastructure::config::{
    BearerToken, ClientConfig, ConfigError, DeliverySettings, RelaySettings, TransportKind,
    WebhookSettings,
};

// Delivery pipeline (for integration tests)
pub use infrastructure::broadcast::{DeliveryHub, SinkReport};
pub use infrastructure::sinks::{ConsoleSink, FileSink, PayloadTemplate, WebhookSink};

// Transports and wire types (for integration tests)
pub use infrastructure::transport::{GrpcTransport, WebSocketTransport, proto};

// Local state
pub use infrastructure::clock::{ManualClock, SystemClock};
pub use infrastructure::usage::JsonUsageStore;

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
