//! Client-Side Rate Limiter
//!
//! Enforces the per-message-size, per-second, per-hour, and daily-byte
//! limits from the caller's claims, and persists usage counters so quota
//! survives across invocations. The relay enforces the same limits
//! server-side; this keeps well-behaved clients from burning requests.
//!
//! All read-modify-write sequences go through one mutex per limiter
//! instance. Two processes sharing an identity are not coordinated beyond
//! last-writer-wins on the usage file.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::ports::{Clock, UsageStore, UsageStoreError};
use crate::domain::claims::{RateLimitPolicy, TokenClaims};
use crate::domain::quota::{LimitError, UsageRecord, UsageStats};

/// Tracks and enforces publish rate limits for one identity.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    account_active: bool,
    usage: Mutex<UsageRecord>,
    store: Box<dyn UsageStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Build a limiter from claims, loading prior usage from `store`.
    ///
    /// A missing or unreadable usage document starts a fresh record; an
    /// expired quota window is rolled immediately.
    pub fn new(claims: &TokenClaims, store: Box<dyn UsageStore>, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let mut record = match store.load() {
            Ok(Some(record)) => record,
            Ok(None) => UsageRecord::new(now),
            Err(e) => {
                tracing::warn!(error = %e, "usage document unreadable; starting fresh");
                UsageRecord::new(now)
            }
        };

        if record.roll_daily_window(now) {
            save_best_effort(store.as_ref(), &record);
        }

        Self {
            policy: RateLimitPolicy::from(claims),
            account_active: claims.is_active,
            usage: Mutex::new(record),
            store,
            clock,
        }
    }

    /// The immutable policy this limiter enforces.
    #[must_use]
    pub const fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Verify a publish of `size` bytes is allowed right now.
    ///
    /// Check order, first failure wins: account inactive, message size,
    /// per-second window, per-hour count, daily byte quota. The per-second
    /// counter is provisionally incremented here (not in
    /// [`record_publish`](Self::record_publish)) so a burst cannot pass two
    /// checks before either records.
    pub fn check_publish_allowed(&self, size: u64) -> Result<(), LimitError> {
        let mut usage = self.usage.lock();
        let now = self.clock.now();

        if usage.roll_daily_window(now) {
            save_best_effort(self.store.as_ref(), &usage);
        }

        if !self.account_active {
            return Err(LimitError::AccountInactive);
        }

        if size > self.policy.max_message_size {
            return Err(LimitError::MessageSize {
                size,
                limit: self.policy.max_message_size,
            });
        }

        usage.roll_second_window(now);
        if usage.second_window_count >= self.policy.max_publish_per_sec {
            return Err(LimitError::PerSecond {
                current: usage.second_window_count,
                limit: self.policy.max_publish_per_sec,
                reset_at: usage.second_window_start + chrono::Duration::seconds(1),
            });
        }
        usage.second_window_count += 1;
        save_best_effort(self.store.as_ref(), &usage);

        if usage.publish_count >= self.policy.max_publish_per_hour {
            return Err(LimitError::PerHour {
                current: usage.publish_count,
                limit: self.policy.max_publish_per_hour,
                reset_at: usage.next_reset(),
            });
        }

        let projected = usage.bytes_published + size;
        if projected > self.policy.daily_quota {
            return Err(LimitError::DailyQuota {
                projected,
                quota: self.policy.daily_quota,
                reset_at: usage.next_reset(),
            });
        }

        Ok(())
    }

    /// Record a publish that already succeeded at the transport.
    ///
    /// Increments the per-hour and daily counters and persists the record.
    /// A failed save is reported but must not fail the publish.
    pub fn record_publish(&self, size: u64) -> Result<(), UsageStoreError> {
        let mut usage = self.usage.lock();
        let now = self.clock.now();

        if usage.roll_daily_window(now) {
            save_best_effort(self.store.as_ref(), &usage);
        }

        usage.publish_count += 1;
        usage.bytes_published += size;
        usage.last_publish_time = Some(now);
        self.store.save(&usage)
    }

    /// Record the start of a subscribe session.
    pub fn record_subscribe(&self) -> Result<(), UsageStoreError> {
        let mut usage = self.usage.lock();
        usage.last_subscribe_time = Some(self.clock.now());
        self.store.save(&usage)
    }

    /// Snapshot current usage against the policy.
    ///
    /// Rolls the quota window lazily first, so an expired window reads as
    /// zeroed counters even with no intervening publish.
    pub fn usage_stats(&self) -> UsageStats {
        let mut usage = self.usage.lock();
        let now = self.clock.now();

        if usage.roll_daily_window(now) {
            save_best_effort(self.store.as_ref(), &usage);
        }

        UsageStats::snapshot(&usage, &self.policy, now)
    }
}

fn save_best_effort(store: &dyn UsageStore, record: &UsageRecord) {
    if let Err(e) = store.save(record) {
        tracing::warn!(error = %e, "failed to persist usage data");
    }
}

// =============================================================================
// Tests
// =============================================================================
