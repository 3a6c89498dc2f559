use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crm_domain::phone::Phone;

use crate::config::LimitSettings;
use crate::domain::repository::OtpRequestLog;
use crate::domain::types::{RateLimitOutcome, RateLimitRecord};
use crate::error::AuthServiceError;

fn window_of(settings: &LimitSettings) -> chrono::Duration {
    // Windows are bounded at config load, so the conversion cannot overflow in practice.
    chrono::Duration::from_std(settings.window).unwrap_or_else(|_| chrono::Duration::days(365))
}

impl RateLimitOutcome {
    /// Convert a denial into `RATE_LIMIT_EXCEEDED`.
    pub fn into_result(self) -> Result<Self, AuthServiceError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AuthServiceError::RateLimitExceeded {
                remaining: self.remaining,
                reset_at: self.reset_at,
            })
        }
    }
}

// ── In-memory fixed window (per client) ───────────────────────────────────────

/// Process-local fixed-window limiter keyed by client identity.
///
/// Counts are not shared between instances and are lost on restart.
pub struct MemoryRateLimiter {
    max_requests: u32,
    window: chrono::Duration,
    buckets: Mutex<HashMap<String, RateLimitRecord>>,
}

impl MemoryRateLimiter {
    pub fn new(settings: LimitSettings) -> Self {
        Self {
            max_requests: settings.max_requests,
            window: window_of(&settings),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, key: &str) -> RateLimitOutcome {
        self.check_at(key, Utc::now())
    }

    /// Count one request for `key` at `now`. A request is allowed while fewer than
    /// `max_requests` were counted in the current window.
    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitOutcome {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let record = buckets
            .entry(key.to_owned())
            .and_modify(|record| {
                if now >= record.reset_at {
                    *record = RateLimitRecord {
                        count: 0,
                        window_start: now,
                        reset_at: now + self.window,
                    };
                }
            })
            .or_insert_with(|| RateLimitRecord {
                count: 0,
                window_start: now,
                reset_at: now + self.window,
            });

        if record.count >= self.max_requests {
            return RateLimitOutcome {
                allowed: false,
                remaining: 0,
                reset_at: record.reset_at,
            };
        }

        record.count += 1;
        RateLimitOutcome {
            allowed: true,
            remaining: self.max_requests - record.count,
            reset_at: record.reset_at,
        }
    }

    /// Drop windows that ended before `now`. Returns the number of keys removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, record| record.reset_at > now);
        before - buckets.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// ── Durable trailing window (per phone) ───────────────────────────────────────

/// OTP request limiter backed by the request log, shared by all instances.
pub struct DurableRateLimiter<L: OtpRequestLog> {
    pub log: L,
    pub settings: LimitSettings,
}

impl<L: OtpRequestLog> DurableRateLimiter<L> {
    pub async fn check(&self, phone: &Phone) -> Result<RateLimitOutcome, AuthServiceError> {
        self.check_at(phone, Utc::now()).await
    }

    /// Allow and record the request if fewer than `max_requests` were made for
    /// `phone` during the trailing window ending at `now`.
    pub async fn check_at(
        &self,
        phone: &Phone,
        now: DateTime<Utc>,
    ) -> Result<RateLimitOutcome, AuthServiceError> {
        let window = window_of(&self.settings);
        let max = self.settings.max_requests;
        let snapshot = self
            .log
            .record_if_below(phone, max, now - window, now)
            .await?;

        let reset_at = snapshot.oldest.unwrap_or(now) + window;
        if !snapshot.recorded {
            tracing::warn!(phone = %phone, count = snapshot.count, "otp request rate limited");
        }
        Ok(RateLimitOutcome {
            allowed: snapshot.recorded,
            remaining: max.saturating_sub(snapshot.count),
            reset_at,
        })
    }

    /// Remove log entries that no longer fall inside any window.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        self.log.prune_before(now - window_of(&self.settings)).await
    }
}
