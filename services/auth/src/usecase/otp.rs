use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngExt;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crm_domain::phone::Phone;

use crate::config::OtpSettings;
use crate::domain::repository::OtpRepository;
use crate::domain::types::{FailedAttempt, OtpRecord};
use crate::error::AuthServiceError;

const SALT_LEN: usize = 16;

/// Uniform random digit string of exactly `length` digits, without a leading zero.
pub fn generate_code(length: u32) -> String {
    let low = 10u64.pow(length - 1);
    let high = 10u64.pow(length);
    rand::rng().random_range(low..high).to_string()
}

fn digest(salt: &[u8], code: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(code.as_bytes());
    hasher.finalize().into()
}

/// Salted SHA-256 of a code, encoded as `hex(salt):hex(digest)`.
pub fn hash_code(code: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::random();
    format!("{}:{}", hex::encode(salt), hex::encode(digest(&salt, code)))
}

/// Constant-time comparison of `code` against a stored hash. Malformed hashes never match.
pub fn code_matches(stored: &str, code: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(':') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    digest(&salt, code)
        .as_slice()
        .ct_eq(expected.as_slice())
        .into()
}

/// A challenge that was just stored. The plaintext code only lives here.
pub struct IssuedOtp {
    pub phone: Phone,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// The fixed test code was used; no SMS should be sent.
    pub is_test: bool,
}

impl fmt::Debug for IssuedOtp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedOtp")
            .field("phone", &self.phone)
            .field("code", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("is_test", &self.is_test)
            .finish()
    }
}

/// OTP challenge lifecycle: issue, verify, consume.
pub struct OtpManager<O: OtpRepository> {
    pub store: O,
    pub settings: OtpSettings,
}

impl<O: OtpRepository> OtpManager<O> {
    pub async fn request_otp(&self, phone: &Phone) -> Result<IssuedOtp, AuthServiceError> {
        self.request_otp_at(phone, Utc::now()).await
    }

    /// Store a fresh challenge for `phone`, replacing any previous one.
    pub async fn request_otp_at(
        &self,
        phone: &Phone,
        now: DateTime<Utc>,
    ) -> Result<IssuedOtp, AuthServiceError> {
        let (code, is_test) = match &self.settings.test_code {
            Some(code) => (code.clone(), true),
            None => (generate_code(self.settings.length), false),
        };
        let record = OtpRecord {
            phone: phone.clone(),
            code_hash: hash_code(&code),
            created_at: now,
            expires_at: now + self.settings.ttl,
            attempts: 0,
        };
        self.store.upsert(&record).await?;
        tracing::info!(phone = %phone, expires_at = %record.expires_at, "otp issued");

        Ok(IssuedOtp {
            phone: phone.clone(),
            code,
            expires_at: record.expires_at,
            is_test,
        })
    }

    pub async fn verify_otp(&self, phone: &Phone, code: &str) -> Result<(), AuthServiceError> {
        self.verify_otp_at(phone, code, Utc::now()).await
    }

    /// Check `code` against the live challenge for `phone`.
    ///
    /// On success the challenge is consumed. On mismatch the attempt is counted;
    /// once `max_attempts` failures were recorded, the next failure deletes the
    /// challenge and returns `MaxAttemptsExceeded`.
    pub async fn verify_otp_at(
        &self,
        phone: &Phone,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        let record = self
            .store
            .find(phone)
            .await?
            .ok_or(AuthServiceError::OtpNotRequested)?;

        if record.is_expired_at(now) {
            self.store.remove(phone, &record.code_hash).await?;
            return Err(AuthServiceError::OtpExpired);
        }

        if code_matches(&record.code_hash, code) {
            // Two concurrent correct submissions race here; only the one that deletes wins.
            if !self.store.remove(phone, &record.code_hash).await? {
                return Err(AuthServiceError::OtpNotRequested);
            }
            tracing::info!(phone = %phone, "otp verified");
            return Ok(());
        }

        let max = self.settings.max_attempts;
        match self
            .store
            .register_failure(phone, &record.code_hash, max)
            .await?
        {
            FailedAttempt::Counted(attempts) => Err(AuthServiceError::OtpMismatch {
                remaining_attempts: max.saturating_sub(attempts),
            }),
            FailedAttempt::Exhausted => {
                tracing::warn!(phone = %phone, "otp attempts exhausted");
                Err(AuthServiceError::MaxAttemptsExceeded)
            }
            FailedAttempt::Missing => Err(AuthServiceError::OtpNotRequested),
        }
    }

    /// Remove challenges that expired without being verified.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        self.store.prune_expired(now).await
    }
}
