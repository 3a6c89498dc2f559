#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crm_domain::phone::Phone;

use crate::domain::types::{AuthUser, FailedAttempt, OtpRecord, RequestWindow, SmsError, SmsReceipt};
use crate::error::AuthServiceError;

/// User store. Users are read on every login and refresh.
pub trait UserRepository: Send + Sync {
    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<AuthUser>, AuthServiceError>;

    /// Insert a user and return the stored record. If another request inserted the
    /// same phone first, that record is returned instead.
    async fn insert(&self, user: &AuthUser) -> Result<AuthUser, AuthServiceError>;

    /// Find a user by id, only if the account is active.
    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<AuthUser>, AuthServiceError>;

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AuthServiceError>;
}

/// Store of live OTP challenges, keyed by phone.
///
/// Mutating operations are conditional on `code_hash` so that a challenge replaced
/// by a newer request is never consumed or counted by a verification of the old one.
pub trait OtpRepository: Send + Sync {
    /// Create or replace the challenge for `record.phone`.
    async fn upsert(&self, record: &OtpRecord) -> Result<(), AuthServiceError>;

    async fn find(&self, phone: &Phone) -> Result<Option<OtpRecord>, AuthServiceError>;

    /// Delete the challenge. Returns `true` only for the caller that removed it.
    async fn remove(&self, phone: &Phone, code_hash: &str) -> Result<bool, AuthServiceError>;

    /// Atomically count a failed verification. Deletes the record instead of
    /// incrementing past `max_attempts`.
    async fn register_failure(
        &self,
        phone: &Phone,
        code_hash: &str,
        max_attempts: u32,
    ) -> Result<FailedAttempt, AuthServiceError>;

    /// Delete every challenge that expired before `now`. Returns the number removed.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError>;
}

/// Durable log of OTP requests backing the per-phone rate limit.
pub trait OtpRequestLog: Send + Sync {
    /// Count requests for `phone` made after `since`; append one at `now` only if the
    /// count is below `max`. Atomic per phone.
    async fn record_if_below(
        &self,
        phone: &Phone,
        max: u32,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RequestWindow, AuthServiceError>;

    /// Drop log entries older than `before`. Returns the number removed.
    async fn prune_before(&self, before: DateTime<Utc>) -> Result<u64, AuthServiceError>;
}

/// Outbound SMS delivery.
pub trait SmsSender: Send + Sync {
    async fn send_otp_code(&self, phone: &Phone, code: &str) -> Result<SmsReceipt, SmsError>;
}
