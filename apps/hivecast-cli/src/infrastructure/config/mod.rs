//! Configuration Module
//!
//! Configuration loading for the CLI client.

mod settings;

pub use settings::{
    BearerToken, ClientConfig, ConfigError, DeliverySettings, RelaySettings, TransportKind,
    WebhookSettings,
};
