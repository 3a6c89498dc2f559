use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};

use crm_auth_types::gate::Forbidden;
use crm_auth_types::identity::IdentityRejection;

/// Auth service failure taxonomy. Every expected failure is a variant; only
/// infrastructure faults end up in `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("too many requests")]
    RateLimitExceeded {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    #[error("no otp requested for this phone")]
    OtpNotRequested,
    #[error("otp expired")]
    OtpExpired,
    #[error("invalid otp")]
    OtpMismatch { remaining_attempts: u32 },
    #[error("maximum otp attempts exceeded")]
    MaxAttemptsExceeded,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("user not found or inactive")]
    UserNotFoundOrInactive,
    #[error("forbidden")]
    Forbidden,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("sms delivery failed")]
    SmsDelivery(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::OtpNotRequested => "OTP_NOT_REQUESTED",
            Self::OtpExpired => "OTP_EXPIRED",
            Self::OtpMismatch { .. } => "OTP_MISMATCH",
            Self::MaxAttemptsExceeded => "MAX_ATTEMPTS_EXCEEDED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::UserNotFoundOrInactive => "USER_NOT_FOUND_OR_INACTIVE",
            Self::Forbidden => "FORBIDDEN",
            Self::Config(_) => "CONFIG_ERROR",
            Self::SmsDelivery(_) => "SMS_DELIVERY_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::OtpNotRequested => StatusCode::BAD_REQUEST,
            Self::RateLimitExceeded { .. } | Self::MaxAttemptsExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::OtpExpired
            | Self::OtpMismatch { .. }
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::UserNotFoundOrInactive => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SmsDelivery(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Forbidden> for AuthServiceError {
    fn from(_: Forbidden) -> Self {
        Self::Forbidden
    }
}

impl From<IdentityRejection> for AuthServiceError {
    fn from(rejection: IdentityRejection) -> Self {
        match rejection {
            IdentityRejection::Invalid => Self::InvalidToken,
            IdentityRejection::Expired => Self::TokenExpired,
        }
    }
}

impl From<JsonRejection> for AuthServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for AuthServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 4xx are expected client errors and TraceLayer already records them.
        // Internal errors need the anyhow chain logged so the root cause is traceable.
        match &self {
            Self::Internal(e) => tracing::error!(error = ?e, kind = "INTERNAL", "internal error"),
            Self::Config(reason) => tracing::error!(%reason, kind = "CONFIG_ERROR", "configuration error"),
            Self::SmsDelivery(reason) => tracing::warn!(%reason, "sms delivery failed"),
            _ => {}
        }

        let mut body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        let mut retry_after = None;
        match &self {
            Self::RateLimitExceeded {
                remaining,
                reset_at,
            } => {
                body["remaining"] = (*remaining).into();
                body["resetAt"] = reset_at.to_rfc3339_opts(SecondsFormat::Millis, true).into();
                let secs = (*reset_at - Utc::now()).num_seconds().max(1);
                retry_after = HeaderValue::from_str(&secs.to_string()).ok();
            }
            Self::OtpMismatch { remaining_attempts } => {
                body["remainingAttempts"] = (*remaining_attempts).into();
            }
            _ => {}
        }

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
