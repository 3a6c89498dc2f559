use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crm_domain::phone::Phone;
use crm_domain::user::UserRole;

/// Auth-relevant view of a CRM user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: Uuid,
    pub phone: Phone,
    pub role: UserRole,
    pub is_active: bool,
    #[serde(serialize_with = "crm_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "crm_core::serde::opt_to_rfc3339_ms")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AuthUser {
    /// Minimal record provisioned on the first successful OTP login of an unknown phone.
    pub fn provision(phone: Phone, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            phone,
            role: UserRole::DEFAULT,
            is_active: true,
            created_at: now,
            last_login_at: None,
        }
    }
}

/// Live OTP challenge for a phone. At most one exists per phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub phone: Phone,
    /// `hex(salt):hex(sha256(salt || code))`.
    pub code_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

impl OtpRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of recording a failed verification against a live challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedAttempt {
    /// Attempts incremented to this value, still within the limit.
    Counted(u32),
    /// The increment would have exceeded the limit; the record was deleted.
    Exhausted,
    /// No matching record (already consumed, expired, or replaced).
    Missing,
}

/// Fixed-window counter for one key of the in-memory limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub reset_at: DateTime<Utc>,
}

/// Snapshot of a phone's OTP request log returned by the durable limiter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestWindow {
    /// Requests inside the window, including the one just recorded.
    pub count: u32,
    /// Oldest request inside the window (the one just recorded if it is the only one).
    pub oldest: Option<DateTime<Utc>>,
    /// Whether this request was appended to the log.
    pub recorded: bool,
}

/// Decision returned by every rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// Freshly minted access/refresh pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh-token lifetime in seconds.
    pub refresh_expires_in: u64,
    #[serde(skip)]
    pub access_token_exp: u64,
}

/// Successful SMS vendor response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsReceipt {
    pub message_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("sms vendor not configured")]
    NotConfigured,
    #[error("sms vendor rejected the message: {0}")]
    Rejected(String),
    #[error("sms vendor unreachable: {0}")]
    Transport(#[source] anyhow::Error),
}
