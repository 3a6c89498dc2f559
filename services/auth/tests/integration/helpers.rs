use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crm_auth::config::{LimitSettings, OtpSettings, TokenSettings};
use crm_auth::domain::repository::{OtpRepository, OtpRequestLog, SmsSender, UserRepository};
use crm_auth::domain::types::{
    AuthUser, FailedAttempt, OtpRecord, RequestWindow, SmsError, SmsReceipt,
};
use crm_auth::error::AuthServiceError;
use crm_auth::usecase::otp::OtpManager;
use crm_auth::usecase::ratelimit::DurableRateLimiter;
use crm_auth::usecase::token::TokenIssuer;
use crm_domain::phone::Phone;
use crm_domain::user::UserRole;

pub const TEST_ACCESS_SECRET: &str = "test-access-secret";
pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret";
pub const TEST_PHONE: &str = "09121234567";

pub fn phone() -> Phone {
    Phone::parse(TEST_PHONE).unwrap()
}

pub fn test_user(role: UserRole) -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        phone: phone(),
        role,
        is_active: true,
        created_at: Utc::now(),
        last_login_at: None,
    }
}

pub fn otp_settings(test_code: Option<&str>) -> OtpSettings {
    OtpSettings {
        length: 4,
        ttl: chrono::Duration::minutes(2),
        max_attempts: 5,
        test_code: test_code.map(str::to_owned),
    }
}

pub fn token_settings() -> TokenSettings {
    TokenSettings {
        access_secret: TEST_ACCESS_SECRET.to_owned(),
        refresh_secret: TEST_REFRESH_SECRET.to_owned(),
        access_ttl: Duration::from_secs(3600),
        refresh_ttl: Duration::from_secs(604_800),
    }
}

pub fn otp_limit() -> LimitSettings {
    LimitSettings {
        max_requests: 5,
        window: Duration::from_secs(3600),
    }
}

pub fn issuer() -> TokenIssuer {
    TokenIssuer::new(token_settings())
}

pub fn otp_manager(store: MockOtpRepo, test_code: Option<&str>) -> OtpManager<MockOtpRepo> {
    OtpManager {
        store,
        settings: otp_settings(test_code),
    }
}

pub fn durable_limiter(log: MockRequestLog) -> DurableRateLimiter<MockRequestLog> {
    DurableRateLimiter {
        log,
        settings: otp_limit(),
    }
}

// ── MockUserRepo ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockUserRepo {
    pub users: Arc<Mutex<Vec<AuthUser>>>,
}

impl MockUserRepo {
    pub fn new(users: Vec<AuthUser>) -> Self {
        Self {
            users: Arc::new(Mutex::new(users)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a shared handle to the internal user list for post-execution inspection.
    pub fn users_handle(&self) -> Arc<Mutex<Vec<AuthUser>>> {
        Arc::clone(&self.users)
    }
}

impl UserRepository for MockUserRepo {
    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<AuthUser>, AuthServiceError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| &u.phone == phone)
            .cloned())
    }

    async fn insert(&self, user: &AuthUser) -> Result<AuthUser, AuthServiceError> {
        let mut users = self.users.lock().unwrap();
        if let Some(existing) = users.iter().find(|u| u.phone == user.phone) {
            return Ok(existing.clone());
        }
        users.push(user.clone());
        Ok(user.clone())
    }

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<AuthUser>, AuthServiceError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id && u.is_active)
            .cloned())
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AuthServiceError> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

// ── MockOtpRepo ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockOtpRepo {
    pub records: Arc<Mutex<HashMap<Phone, OtpRecord>>>,
}

impl MockOtpRepo {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records_handle(&self) -> Arc<Mutex<HashMap<Phone, OtpRecord>>> {
        Arc::clone(&self.records)
    }
}

impl OtpRepository for MockOtpRepo {
    async fn upsert(&self, record: &OtpRecord) -> Result<(), AuthServiceError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.phone.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, phone: &Phone) -> Result<Option<OtpRecord>, AuthServiceError> {
        let found = self.records.lock().unwrap().get(phone).cloned();
        // Let concurrent verifications interleave between read and write.
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn remove(&self, phone: &Phone, code_hash: &str) -> Result<bool, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        match records.get(phone) {
            Some(r) if r.code_hash == code_hash => {
                records.remove(phone);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn register_failure(
        &self,
        phone: &Phone,
        code_hash: &str,
        max_attempts: u32,
    ) -> Result<FailedAttempt, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        let Some(record) = records.get_mut(phone).filter(|r| r.code_hash == code_hash) else {
            return Ok(FailedAttempt::Missing);
        };
        let attempts = record.attempts + 1;
        if attempts > max_attempts {
            records.remove(phone);
            return Ok(FailedAttempt::Exhausted);
        }
        record.attempts = attempts;
        Ok(FailedAttempt::Counted(attempts))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.expires_at >= now);
        Ok((before - records.len()) as u64)
    }
}

// ── MockRequestLog ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockRequestLog {
    pub entries: Arc<Mutex<Vec<(Phone, DateTime<Utc>)>>>,
}

impl MockRequestLog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries_handle(&self) -> Arc<Mutex<Vec<(Phone, DateTime<Utc>)>>> {
        Arc::clone(&self.entries)
    }
}

impl OtpRequestLog for MockRequestLog {
    async fn record_if_below(
        &self,
        phone: &Phone,
        max: u32,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RequestWindow, AuthServiceError> {
        let mut entries = self.entries.lock().unwrap();
        let in_window: Vec<DateTime<Utc>> = entries
            .iter()
            .filter(|(p, at)| p == phone && *at > since)
            .map(|(_, at)| *at)
            .collect();
        let count = in_window.len() as u32;
        let oldest = in_window.iter().min().copied();
        if count >= max {
            return Ok(RequestWindow {
                count,
                oldest,
                recorded: false,
            });
        }
        entries.push((phone.clone(), now));
        Ok(RequestWindow {
            count: count + 1,
            oldest: oldest.or(Some(now)),
            recorded: true,
        })
    }

    async fn prune_before(&self, before: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let mut entries = self.entries.lock().unwrap();
        let len = entries.len();
        entries.retain(|(_, at)| *at >= before);
        Ok((len - entries.len()) as u64)
    }
}

// ── MockSms ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Default)]
pub enum SmsMode {
    #[default]
    Deliver,
    NotConfigured,
    Reject,
}

#[derive(Clone, Default)]
pub struct MockSms {
    pub mode: SmsMode,
    pub sent: Arc<Mutex<Vec<(Phone, String)>>>,
}

impl MockSms {
    pub fn new(mode: SmsMode) -> Self {
        Self {
            mode,
            sent: Arc::default(),
        }
    }

    pub fn sent_handle(&self) -> Arc<Mutex<Vec<(Phone, String)>>> {
        Arc::clone(&self.sent)
    }
}

impl SmsSender for MockSms {
    async fn send_otp_code(&self, phone: &Phone, code: &str) -> Result<SmsReceipt, SmsError> {
        match self.mode {
            SmsMode::Deliver => {
                self.sent
                    .lock()
                    .unwrap()
                    .push((phone.clone(), code.to_owned()));
                Ok(SmsReceipt {
                    message_id: Some("msg-1".to_owned()),
                })
            }
            SmsMode::NotConfigured => Err(SmsError::NotConfigured),
            SmsMode::Reject => Err(SmsError::Rejected("status 418: no credit".to_owned())),
        }
    }
}
