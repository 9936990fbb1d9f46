//! Credential Claims and Rate-Limit Policy
//!
//! The claims document is the decoded (not signature-verified) credential
//! payload supplied by the identity layer. Missing limit fields fall back to
//! the documented defaults so a minimal token still yields a usable policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default maximum publish operations per hour.
pub const DEFAULT_MAX_PUBLISH_PER_HOUR: u32 = 100;

/// Default maximum publish operations per second.
pub const DEFAULT_MAX_PUBLISH_PER_SEC: u32 = 2;

/// Default maximum message size in bytes (2 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 2 << 20;

/// Default daily publish quota in bytes (100 MiB).
pub const DEFAULT_DAILY_QUOTA: u64 = 100 << 20;

/// Decoded credential claims describing account status and limits.
///
/// Produced by the identity layer from an already-parsed token; this crate
/// never validates signatures (tokens are decoded, not verified).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Stable identity subject; keys the on-disk usage document.
    #[serde(default)]
    pub subject: String,

    /// Client identifier used on the publish path and in webhook payloads.
    #[serde(default)]
    pub client_id: String,

    /// Whether the account is active. Inactive accounts cannot publish.
    #[serde(default)]
    pub is_active: bool,

    /// Maximum publish operations per hour.
    #[serde(default = "default_max_publish_per_hour")]
    pub max_publish_per_hour: u32,

    /// Maximum publish operations per second.
    #[serde(default = "default_max_publish_per_sec")]
    pub max_publish_per_sec: u32,

    /// Maximum size of a single message in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: u64,

    /// Maximum bytes publishable per 24-hour quota window.
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u64,

    /// Token issue time, if present in the claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,

    /// Token expiry time, if present in the claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for TokenClaims {
    fn default() -> Self {
        Self {
            subject: String::new(),
            client_id: String::new(),
            is_active: false,
            max_publish_per_hour: DEFAULT_MAX_PUBLISH_PER_HOUR,
            max_publish_per_sec: DEFAULT_MAX_PUBLISH_PER_SEC,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            daily_quota: DEFAULT_DAILY_QUOTA,
            issued_at: None,
            expires_at: None,
        }
    }
}

impl TokenClaims {
    /// Identity used to key local state; `default` when no subject claim.
    #[must_use]
    pub fn identity(&self) -> &str {
        if self.subject.is_empty() {
            "default"
        } else {
            &self.subject
        }
    }
}

const fn default_max_publish_per_hour() -> u32 {
    DEFAULT_MAX_PUBLISH_PER_HOUR
}

const fn default_max_publish_per_sec() -> u32 {
    DEFAULT_MAX_PUBLISH_PER_SEC
}

const fn default_max_message_size() -> u64 {
    DEFAULT_MAX_MESSAGE_SIZE
}

const fn default_daily_quota() -> u64 {
    DEFAULT_DAILY_QUOTA
}

/// Immutable rate-limit policy for the lifetime of one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum publish operations per hour.
    pub max_publish_per_hour: u32,
    /// Maximum publish operations per second.
    pub max_publish_per_sec: u32,
    /// Maximum size of a single message in bytes.
    pub max_message_size: u64,
    /// Maximum bytes publishable per 24-hour quota window.
    pub daily_quota: u64,
}

impl From<&TokenClaims> for RateLimitPolicy {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            max_publish_per_hour: claims.max_publish_per_hour,
            max_publish_per_sec: claims.max_publish_per_sec,
            max_message_size: claims.max_message_size,
            daily_quota: claims.daily_quota,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
