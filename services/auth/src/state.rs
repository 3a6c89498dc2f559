use std::sync::Arc;

use axum::extract::FromRef;
use sea_orm::DatabaseConnection;

use crm_auth_types::identity::AccessTokenKey;
use crm_domain::permission::RolePermissions;

use crate::config::{LimitSettings, OtpSettings, Settings};
use crate::domain::types::SmsError;
use crate::infra::db::{DbOtpRepository, DbOtpRequestLog, DbUserRepository};
use crate::infra::sms::HttpSmsSender;
use crate::usecase::otp::OtpManager;
use crate::usecase::ratelimit::{DurableRateLimiter, MemoryRateLimiter};
use crate::usecase::token::TokenIssuer;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub issuer: TokenIssuer,
    pub access_key: AccessTokenKey,
    pub otp: OtpSettings,
    pub otp_rate_limit: LimitSettings,
    pub api_limiter: Arc<MemoryRateLimiter>,
    pub sms: HttpSmsSender,
    pub roles: Arc<RolePermissions>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, settings: Settings) -> Result<Self, SmsError> {
        Ok(Self {
            db,
            access_key: AccessTokenKey::new(settings.tokens.access_secret.as_str()),
            issuer: TokenIssuer::new(settings.tokens),
            otp: settings.otp,
            otp_rate_limit: settings.otp_rate_limit,
            api_limiter: Arc::new(MemoryRateLimiter::new(settings.api_rate_limit)),
            sms: HttpSmsSender::new(settings.sms)?,
            roles: Arc::new(settings.role_permissions),
        })
    }

    pub fn user_repo(&self) -> DbUserRepository {
        DbUserRepository {
            db: self.db.clone(),
        }
    }

    pub fn otp_manager(&self) -> OtpManager<DbOtpRepository> {
        OtpManager {
            store: DbOtpRepository {
                db: self.db.clone(),
            },
            settings: self.otp.clone(),
        }
    }

    pub fn otp_limiter(&self) -> DurableRateLimiter<DbOtpRequestLog> {
        DurableRateLimiter {
            log: DbOtpRequestLog {
                db: self.db.clone(),
            },
            settings: self.otp_rate_limit,
        }
    }
}

impl FromRef<AppState> for AccessTokenKey {
    fn from_ref(state: &AppState) -> Self {
        state.access_key.clone()
    }
}
