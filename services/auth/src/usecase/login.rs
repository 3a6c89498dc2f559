use chrono::{DateTime, Utc};

use crm_domain::phone::Phone;

use crate::domain::repository::{OtpRepository, OtpRequestLog, SmsSender, UserRepository};
use crate::domain::types::{AuthUser, SmsError, TokenPair};
use crate::error::AuthServiceError;
use crate::usecase::otp::OtpManager;
use crate::usecase::ratelimit::DurableRateLimiter;
use crate::usecase::token::TokenIssuer;

fn parse_phone(raw: &str) -> Result<Phone, AuthServiceError> {
    Phone::parse(raw).map_err(|e| AuthServiceError::Validation(e.to_string()))
}

// ── RequestOtp ────────────────────────────────────────────────────────────────

pub struct RequestOtpInput {
    pub phone: String,
}

#[derive(Debug)]
pub struct RequestOtpOutput {
    pub phone: Phone,
    pub expires_at: DateTime<Utc>,
    /// OTP requests left for this phone in the current window.
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub message_id: Option<String>,
    /// Set only in test mode, where no SMS is sent.
    pub test_code: Option<String>,
}

pub struct RequestOtpUseCase<L, O, S>
where
    L: OtpRequestLog,
    O: OtpRepository,
    S: SmsSender,
{
    pub limiter: DurableRateLimiter<L>,
    pub otp: OtpManager<O>,
    pub sms: S,
}

impl<L, O, S> RequestOtpUseCase<L, O, S>
where
    L: OtpRequestLog,
    O: OtpRepository,
    S: SmsSender,
{
    pub async fn execute(&self, input: RequestOtpInput) -> Result<RequestOtpOutput, AuthServiceError> {
        // 1. Normalize → 400 on garbage
        let phone = parse_phone(&input.phone)?;

        // 2. Per-phone window → 429 before anything is stored
        let outcome = self.limiter.check(&phone).await?.into_result()?;

        // 3. Store the challenge (replaces any previous one)
        let issued = self.otp.request_otp(&phone).await?;

        // 4. Deliver. The challenge stays stored if delivery fails.
        let (message_id, test_code) = if issued.is_test {
            tracing::info!(phone = %phone, "otp test mode, sms skipped");
            (None, Some(issued.code.clone()))
        } else {
            match self.sms.send_otp_code(&phone, &issued.code).await {
                Ok(receipt) => (receipt.message_id, None),
                Err(SmsError::NotConfigured) => {
                    return Err(AuthServiceError::Config(SmsError::NotConfigured.to_string()));
                }
                Err(e) => return Err(AuthServiceError::SmsDelivery(e.to_string())),
            }
        };

        Ok(RequestOtpOutput {
            phone,
            expires_at: issued.expires_at,
            remaining: outcome.remaining,
            reset_at: outcome.reset_at,
            message_id,
            test_code,
        })
    }
}

// ── VerifyOtp (login) ─────────────────────────────────────────────────────────

pub struct VerifyOtpInput {
    pub phone: String,
    pub code: String,
}

#[derive(Debug)]
pub struct LoginOutput {
    pub user: AuthUser,
    pub is_new_user: bool,
    pub tokens: TokenPair,
}

pub struct VerifyOtpUseCase<O, U>
where
    O: OtpRepository,
    U: UserRepository,
{
    pub otp: OtpManager<O>,
    pub users: U,
    pub issuer: TokenIssuer,
}

impl<O, U> VerifyOtpUseCase<O, U>
where
    O: OtpRepository,
    U: UserRepository,
{
    pub async fn execute(&self, input: VerifyOtpInput) -> Result<LoginOutput, AuthServiceError> {
        let phone = parse_phone(&input.phone)?;
        let code = input.code.trim();
        let length = self.otp.settings.length as usize;
        if code.len() != length || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuthServiceError::Validation(format!(
                "code must be {length} digits"
            )));
        }

        self.otp.verify_otp(&phone, code).await?;

        let (user, is_new_user) = match self.users.find_by_phone(&phone).await? {
            Some(user) => (user, false),
            None => {
                let candidate = AuthUser::provision(phone.clone(), Utc::now());
                let user = self.users.insert(&candidate).await?;
                // A concurrent login may have provisioned the phone first.
                let created = user.id == candidate.id;
                if created {
                    tracing::info!(user_id = %user.id, phone = %phone, "user provisioned");
                }
                (user, created)
            }
        };

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "login attempt for inactive user");
            return Err(AuthServiceError::UserNotFoundOrInactive);
        }

        let tokens = self.issuer.issue_token_pair(&self.users, &user).await?;
        Ok(LoginOutput {
            user,
            is_new_user,
            tokens,
        })
    }
}
