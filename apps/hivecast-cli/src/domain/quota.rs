//! Usage Accounting and Limit Errors
//!
//! Pure quota math for the rate limiter: the persistent usage record, the
//! lazy window rolls, and the limit-violation error taxonomy. All reset
//! decisions are evaluated lazily at call time; nothing here runs on a timer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::claims::RateLimitPolicy;

/// Length of the daily quota window.
#[must_use]
pub fn quota_window() -> Duration {
    Duration::hours(24)
}

/// Persistent per-identity usage counters.
///
/// Serde field names match the on-disk usage document so state written by
/// earlier client versions keeps loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Publishes recorded in the current quota window.
    pub publish_count: u32,
    /// Bytes published in the current quota window.
    pub bytes_published: u64,
    /// Start of the current quota window.
    pub last_reset: DateTime<Utc>,
    /// Time of the most recent recorded publish.
    #[serde(default)]
    pub last_publish_time: Option<DateTime<Utc>>,
    /// Time of the most recent subscribe session start.
    #[serde(default)]
    pub last_subscribe_time: Option<DateTime<Utc>>,
    /// Publishes admitted in the current one-second window.
    #[serde(rename = "second_publish_count")]
    pub second_window_count: u32,
    /// Start of the current one-second window.
    #[serde(rename = "last_second_time")]
    pub second_window_start: DateTime<Utc>,
}

impl UsageRecord {
    /// Create a zeroed record whose windows start at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            publish_count: 0,
            bytes_published: 0,
            last_reset: now,
            last_publish_time: None,
            last_subscribe_time: None,
            second_window_count: 0,
            second_window_start: now,
        }
    }

    /// Roll the daily window if more than 24 hours have passed.
    ///
    /// Returns `true` when a reset happened (the caller should persist).
    pub fn roll_daily_window(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.last_reset > quota_window() {
            self.publish_count = 0;
            self.bytes_published = 0;
            self.last_reset = now;
            true
        } else {
            false
        }
    }

    /// Roll the per-second window if at least one second has passed.
    pub fn roll_second_window(&mut self, now: DateTime<Utc>) {
        if now - self.second_window_start >= Duration::seconds(1) {
            self.second_window_start = now;
            self.second_window_count = 0;
        }
    }

    /// End of the current quota window.
    #[must_use]
    pub fn next_reset(&self) -> DateTime<Utc> {
        self.last_reset + quota_window()
    }
}

/// Point-in-time usage snapshot paired with the active policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    /// Publishes recorded in the current quota window.
    pub publish_count: u32,
    /// Hourly publish limit from the policy.
    pub publish_limit_per_hour: u32,
    /// Publishes admitted in the current one-second window.
    pub second_window_count: u32,
    /// Per-second publish limit from the policy.
    pub publish_limit_per_sec: u32,
    /// Bytes published in the current quota window.
    pub bytes_published: u64,
    /// Daily byte quota from the policy.
    pub daily_quota: u64,
    /// When the quota window resets.
    pub next_reset: DateTime<Utc>,
    /// Remaining time until the quota window resets, in whole seconds.
    pub seconds_until_reset: i64,
    /// Time of the most recent recorded publish.
    pub last_publish_time: Option<DateTime<Utc>>,
    /// Time of the most recent subscribe session start.
    pub last_subscribe_time: Option<DateTime<Utc>>,
}

impl UsageStats {
    /// Build a snapshot of `record` under `policy` at time `now`.
    #[must_use]
    pub fn snapshot(record: &UsageRecord, policy: &RateLimitPolicy, now: DateTime<Utc>) -> Self {
        let next_reset = record.next_reset();
        Self {
            publish_count: record.publish_count,
            publish_limit_per_hour: policy.max_publish_per_hour,
            second_window_count: record.second_window_count,
            publish_limit_per_sec: policy.max_publish_per_sec,
            bytes_published: record.bytes_published,
            daily_quota: policy.daily_quota,
            next_reset,
            seconds_until_reset: (next_reset - now).num_seconds(),
            last_publish_time: record.last_publish_time,
            last_subscribe_time: record.last_subscribe_time,
        }
    }
}

/// A publish was rejected by the client-side limiter.
///
/// Each variant carries the observed usage, the violated limit, and the time
/// the relevant window resets so callers can render precise diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// The account's `is_active` claim is false.
    #[error("account is inactive; contact support or check your subscription status")]
    AccountInactive,

    /// The message exceeds the maximum allowed size.
    #[error("message size {size} exceeds limit of {limit} bytes")]
    MessageSize {
        /// Size of the rejected message in bytes.
        size: u64,
        /// Maximum allowed message size in bytes.
        limit: u64,
    },

    /// The per-second publish window is exhausted.
    #[error("per-second publish limit reached ({current}/{limit} per second)")]
    PerSecond {
        /// Publishes already admitted in the current window.
        current: u32,
        /// Per-second limit.
        limit: u32,
        /// When the one-second window reopens.
        reset_at: DateTime<Utc>,
    },

    /// The hourly publish count is exhausted.
    #[error("hourly publish limit reached ({current}/{limit}); resets at {reset_at}")]
    PerHour {
        /// Publishes recorded in the current quota window.
        current: u32,
        /// Hourly limit.
        limit: u32,
        /// When the quota window resets.
        reset_at: DateTime<Utc>,
    },

    /// Accepting the message would exceed the daily byte quota.
    #[error("daily quota exceeded ({projected}/{quota} bytes); resets at {reset_at}")]
    DailyQuota {
        /// Bytes already published plus the incoming message size.
        projected: u64,
        /// Daily quota in bytes.
        quota: u64,
        /// When the quota window resets.
        reset_at: DateTime<Utc>,
    },
}

// =============================================================================
// Tests
// =============================================================================
