use std::time::Duration;

use serde::Deserialize;

use crm_core::config::Config;
use crm_domain::permission::{RolePermissions, RoleTableError};

/// Deployment environment. OTP test mode is refused in `Production`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Production,
    Development,
    Test,
}

/// Auth service configuration loaded from environment variables.
///
/// Field `foo_bar` is read from `FOO_BAR`.
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// HMAC secret for access tokens. Required.
    pub jwt_access_secret: String,
    /// HMAC secret for refresh tokens. Required, must differ from the access secret.
    pub jwt_refresh_secret: String,
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_token_ttl_secs")]
    pub refresh_token_ttl_secs: u64,
    /// Number of digits in an OTP code (4..=8).
    #[serde(default = "default_otp_length")]
    pub otp_length: u32,
    #[serde(default = "default_otp_expiration_minutes")]
    pub otp_expiration_minutes: u32,
    #[serde(default = "default_otp_max_attempts")]
    pub otp_max_attempts: u32,
    /// OTP requests allowed per phone per window.
    #[serde(default = "default_otp_rate_limit_max")]
    pub otp_rate_limit_max: u32,
    #[serde(default = "default_otp_rate_limit_window_secs")]
    pub otp_rate_limit_window_secs: u64,
    /// Requests allowed per client per window on `/auth/*`.
    #[serde(default = "default_api_rate_limit_max")]
    pub api_rate_limit_max: u32,
    #[serde(default = "default_api_rate_limit_window_secs")]
    pub api_rate_limit_window_secs: u64,
    #[serde(default = "default_app_env")]
    pub app_env: AppEnv,
    /// Skip SMS delivery and use `otp_test_code`. Rejected in production.
    #[serde(default)]
    pub otp_test_mode: bool,
    #[serde(default = "default_otp_test_code")]
    pub otp_test_code: String,
    /// SMS vendor API key. Without it, OTP delivery fails at call time.
    pub sms_api_key: Option<String>,
    /// SMS vendor verify-lookup template name.
    pub sms_template: Option<String>,
    #[serde(default = "default_sms_base_url")]
    pub sms_base_url: String,
    /// Upper bound on one SMS vendor call, in seconds.
    #[serde(default = "default_sms_timeout_secs")]
    pub sms_timeout_secs: u64,
    /// JSON override of the role → permissions table.
    pub role_permissions: Option<String>,
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,
}

impl Config for AuthConfig {}

fn default_access_token_ttl_secs() -> u64 {
    60 * 60
}
fn default_refresh_token_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}
fn default_otp_length() -> u32 {
    4
}
fn default_otp_expiration_minutes() -> u32 {
    2
}
fn default_otp_max_attempts() -> u32 {
    5
}
fn default_otp_rate_limit_max() -> u32 {
    5
}
fn default_otp_rate_limit_window_secs() -> u64 {
    60 * 60
}
fn default_api_rate_limit_max() -> u32 {
    100
}
fn default_api_rate_limit_window_secs() -> u64 {
    15 * 60
}
fn default_app_env() -> AppEnv {
    AppEnv::Production
}
fn default_otp_test_code() -> String {
    "1234".to_owned()
}
fn default_sms_base_url() -> String {
    "https://api.kavenegar.com/v1".to_owned()
}
fn default_sms_timeout_secs() -> u64 {
    10
}
fn default_auth_port() -> u16 {
    3000
}

const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Startup-time configuration failure. The binary refuses to start on any of these.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} must not be empty")]
    EmptySecret(&'static str),
    #[error("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedSecret,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{0} must not exceed one year")]
    TooLong(&'static str),
    #[error("OTP_LENGTH must be between 4 and 8, got {0}")]
    OtpLength(u32),
    #[error("OTP_TEST_CODE must be {0} digits")]
    TestCode(u32),
    #[error("OTP_TEST_MODE is not allowed when APP_ENV=production")]
    TestModeInProduction,
    #[error("ROLE_PERMISSIONS: {0}")]
    RoleTable(#[from] RoleTableError),
}

/// OTP settings after validation.
#[derive(Debug, Clone)]
pub struct OtpSettings {
    pub length: u32,
    pub ttl: chrono::Duration,
    pub max_attempts: u32,
    /// Fixed code used instead of a random one. Only `Some` outside production.
    pub test_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct LimitSettings {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub template: Option<String>,
    pub timeout: Duration,
}

/// Fully validated configuration, split per component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub auth_port: u16,
    pub otp: OtpSettings,
    pub tokens: TokenSettings,
    pub otp_rate_limit: LimitSettings,
    pub api_rate_limit: LimitSettings,
    pub sms: SmsSettings,
    pub role_permissions: RolePermissions,
}

impl AuthConfig {
    /// Read the process environment and validate.
    pub fn load() -> Result<Settings, ConfigError> {
        Self::try_from_env()?.validate()
    }

    pub fn validate(self) -> Result<Settings, ConfigError> {
        if self.jwt_access_secret.trim().is_empty() {
            return Err(ConfigError::EmptySecret("JWT_ACCESS_SECRET"));
        }
        if self.jwt_refresh_secret.trim().is_empty() {
            return Err(ConfigError::EmptySecret("JWT_REFRESH_SECRET"));
        }
        if self.jwt_access_secret == self.jwt_refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        if !(4..=8).contains(&self.otp_length) {
            return Err(ConfigError::OtpLength(self.otp_length));
        }
        for (name, value) in [
            ("ACCESS_TOKEN_TTL_SECS", self.access_token_ttl_secs),
            ("REFRESH_TOKEN_TTL_SECS", self.refresh_token_ttl_secs),
            ("OTP_EXPIRATION_MINUTES", u64::from(self.otp_expiration_minutes)),
            ("OTP_MAX_ATTEMPTS", u64::from(self.otp_max_attempts)),
            ("OTP_RATE_LIMIT_MAX", u64::from(self.otp_rate_limit_max)),
            ("OTP_RATE_LIMIT_WINDOW_SECS", self.otp_rate_limit_window_secs),
            ("API_RATE_LIMIT_MAX", u64::from(self.api_rate_limit_max)),
            ("API_RATE_LIMIT_WINDOW_SECS", self.api_rate_limit_window_secs),
            ("SMS_TIMEOUT_SECS", self.sms_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        for (name, secs) in [
            ("ACCESS_TOKEN_TTL_SECS", self.access_token_ttl_secs),
            ("REFRESH_TOKEN_TTL_SECS", self.refresh_token_ttl_secs),
            ("OTP_EXPIRATION_MINUTES", u64::from(self.otp_expiration_minutes) * 60),
            ("OTP_RATE_LIMIT_WINDOW_SECS", self.otp_rate_limit_window_secs),
            ("API_RATE_LIMIT_WINDOW_SECS", self.api_rate_limit_window_secs),
            ("SMS_TIMEOUT_SECS", self.sms_timeout_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::TooLong(name));
            }
        }

        let test_code = if self.otp_test_mode {
            if self.app_env == AppEnv::Production {
                return Err(ConfigError::TestModeInProduction);
            }
            let code = self.otp_test_code.trim().to_owned();
            if code.len() != self.otp_length as usize || !code.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(ConfigError::TestCode(self.otp_length));
            }
            Some(code)
        } else {
            None
        };

        let role_permissions = match self.role_permissions.as_deref() {
            Some(raw) if !raw.trim().is_empty() => RolePermissions::from_json(raw)?,
            _ => RolePermissions::standard(),
        };

        Ok(Settings {
            database_url: self.database_url,
            auth_port: self.auth_port,
            otp: OtpSettings {
                length: self.otp_length,
                ttl: chrono::Duration::minutes(i64::from(self.otp_expiration_minutes)),
                max_attempts: self.otp_max_attempts,
                test_code,
            },
            tokens: TokenSettings {
                access_secret: self.jwt_access_secret,
                refresh_secret: self.jwt_refresh_secret,
                access_ttl: Duration::from_secs(self.access_token_ttl_secs),
                refresh_ttl: Duration::from_secs(self.refresh_token_ttl_secs),
            },
            otp_rate_limit: LimitSettings {
                max_requests: self.otp_rate_limit_max,
                window: Duration::from_secs(self.otp_rate_limit_window_secs),
            },
            api_rate_limit: LimitSettings {
                max_requests: self.api_rate_limit_max,
                window: Duration::from_secs(self.api_rate_limit_window_secs),
            },
            sms: SmsSettings {
                base_url: self.sms_base_url,
                api_key: self.sms_api_key.filter(|k| !k.trim().is_empty()),
                template: self.sms_template.filter(|t| !t.trim().is_empty()),
                timeout: Duration::from_secs(self.sms_timeout_secs),
            },
            role_permissions,
        })
    }
}
