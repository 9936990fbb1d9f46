//! Client Configuration Settings
//!
//! Configuration types for the CLI client, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Wire mechanism used to reach the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// WebSocket transport (default).
    #[default]
    Websocket,
    /// gRPC transport.
    Grpc,
}

impl TransportKind {
    /// Parse transport kind from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "grpc" => Self::Grpc,
            _ => Self::Websocket,
        }
    }

    /// Get the transport name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::Grpc => "grpc",
        }
    }
}

/// Bearer token presented to the relay.
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token string.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// The raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BearerToken").field(&"[REDACTED]").finish()
    }
}

/// Relay endpoint settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Which wire mechanism to use.
    pub transport: TransportKind,
    /// WebSocket endpoint URL.
    pub websocket_url: String,
    /// gRPC endpoint URL.
    pub grpc_url: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            websocket_url: "wss://relay.hivecast.dev/ws".to_string(),
            grpc_url: "https://relay.hivecast.dev:443".to_string(),
        }
    }
}

/// Delivery pipeline settings.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Capacity of the sink fan-out channel.
    pub channel_capacity: usize,
    /// File to append received messages to, if any.
    pub persist_path: Option<PathBuf>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
            persist_path: None,
        }
    }
}

/// Webhook forwarding settings.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Webhook endpoint; webhook forwarding is off when absent.
    pub url: Option<String>,
    /// Payload template name or inline template body, if any.
    pub template: Option<String>,
    /// Bounded queue capacity between receive loop and dispatcher.
    pub queue_capacity: usize,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: None,
            template: None,
            queue_capacity: 100,
            request_timeout: Duration::from_secs(3),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay endpoints and transport selection.
    pub relay: RelaySettings,
    /// Bearer token for the relay, if configured.
    pub token: Option<BearerToken>,
    /// Path to the decoded claims document, if configured.
    pub claims_path: Option<PathBuf>,
    /// Local state directory for usage documents.
    pub state_dir: PathBuf,
    /// Topics to subscribe to.
    pub topics: Vec<String>,
    /// Delivery pipeline settings.
    pub delivery: DeliverySettings,
    /// Webhook forwarding settings.
    pub webhook: WebhookSettings,
}

impl ClientConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a provided value is present but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let relay = RelaySettings {
            transport: std::env::var("HIVECAST_TRANSPORT")
                .map(|s| TransportKind::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            websocket_url: env_or(
                "HIVECAST_WEBSOCKET_URL",
                &RelaySettings::default().websocket_url,
            )?,
            grpc_url: env_or("HIVECAST_GRPC_URL", &RelaySettings::default().grpc_url)?,
        };

        let token = optional_env("HIVECAST_TOKEN")?.map(BearerToken::new);
        let claims_path = optional_env("HIVECAST_CLAIMS_PATH")?.map(PathBuf::from);

        let state_dir = optional_env("HIVECAST_STATE_DIR")?.map_or_else(default_state_dir, PathBuf::from);

        let topics = optional_env("HIVECAST_TOPICS")?
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let delivery = DeliverySettings {
            channel_capacity: parse_env_usize(
                "HIVECAST_DELIVERY_CAPACITY",
                DeliverySettings::default().channel_capacity,
            ),
            persist_path: optional_env("HIVECAST_PERSIST_PATH")?.map(PathBuf::from),
        };

        let webhook = WebhookSettings {
            url: optional_env("HIVECAST_WEBHOOK_URL")?,
            template: optional_env("HIVECAST_WEBHOOK_TEMPLATE")?,
            queue_capacity: parse_env_usize(
                "HIVECAST_WEBHOOK_QUEUE_CAPACITY",
                WebhookSettings::default().queue_capacity,
            ),
            request_timeout: parse_env_duration_secs(
                "HIVECAST_WEBHOOK_TIMEOUT_SECS",
                WebhookSettings::default().request_timeout,
            ),
        };

        Ok(Self {
            relay,
            token,
            claims_path,
            state_dir,
            topics,
            delivery,
            webhook,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// State directory under the user's home, with a relative fallback for
/// environments without `HOME`.
fn default_state_dir() -> PathBuf {
    std::env::var("HOME").map_or_else(
        |_| PathBuf::from(".hivecast"),
        |home| PathBuf::from(home).join(".hivecast"),
    )
}

fn env_or(key: &str, default: &str) -> Result<String, ConfigError> {
    match optional_env(key)? {
        Some(value) => Ok(value),
        None => Ok(default.to_string()),
    }
}

fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(None),
    }
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
