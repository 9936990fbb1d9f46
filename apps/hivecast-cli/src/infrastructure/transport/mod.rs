//! Transport Adapters
//!
//! Concrete [`MessageTransport`] implementations and the wire types they
//! speak. The transport is selected by configuration; both speak to the same
//! relay and feed the same delivery pipeline.

pub mod grpc;
pub mod proto;
pub mod websocket;

pub use grpc::GrpcTransport;
pub use websocket::WebSocketTransport;

use crate::application::ports::MessageTransport;
use crate::infrastructure::config::{ClientConfig, TransportKind};

/// Build the configured transport for `client_id`.
#[must_use]
pub fn build(config: &ClientConfig, client_id: &str) -> Box<dyn MessageTransport> {
    match config.relay.transport {
        TransportKind::Websocket => Box::new(WebSocketTransport::new(
            config.relay.websocket_url.clone(),
            config.topics.clone(),
            client_id.to_string(),
            config.token.clone(),
        )),
        TransportKind::Grpc => Box::new(GrpcTransport::new(
            config.relay.grpc_url.clone(),
            config.topics.clone(),
            client_id.to_string(),
            config.token.clone(),
        )),
    }
}
