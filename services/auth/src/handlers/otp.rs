use axum::extract::rejection::JsonRejection;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::{AuthUser, TokenPair};
use crate::error::AuthServiceError;
use crate::state::AppState;
use crate::usecase::login::{
    RequestOtpInput, RequestOtpUseCase, VerifyOtpInput, VerifyOtpUseCase,
};

// ── POST /auth/otp ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RequestOtpRequest {
    pub phone: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpResponse {
    pub phone: String,
    #[serde(serialize_with = "crm_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
    /// Seconds until the code expires.
    pub expires_in: i64,
    pub remaining: u32,
    #[serde(serialize_with = "crm_core::serde::to_rfc3339_ms")]
    pub reset_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_code: Option<String>,
}

pub async fn request_otp(
    State(state): State<AppState>,
    payload: Result<Json<RequestOtpRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let Json(body) = payload?;
    let usecase = RequestOtpUseCase {
        limiter: state.otp_limiter(),
        otp: state.otp_manager(),
        sms: state.sms.clone(),
    };
    let output = usecase
        .execute(RequestOtpInput { phone: body.phone })
        .await?;

    let body = RequestOtpResponse {
        phone: output.phone.into_inner(),
        expires_at: output.expires_at,
        expires_in: (output.expires_at - Utc::now()).num_seconds().max(0),
        remaining: output.remaining,
        reset_at: output.reset_at,
        message_id: output.message_id,
        test_code: output.test_code,
    };
    Ok((StatusCode::CREATED, Json(body)))
}

// ── POST /auth/otp/verify ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: AuthUser,
    pub is_new_user: bool,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

pub async fn verify_otp(
    State(state): State<AppState>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let Json(body) = payload?;
    let usecase = VerifyOtpUseCase {
        otp: state.otp_manager(),
        users: state.user_repo(),
        issuer: state.issuer.clone(),
    };
    let output = usecase
        .execute(VerifyOtpInput {
            phone: body.phone,
            code: body.code,
        })
        .await?;

    Ok(Json(LoginResponse {
        user: output.user,
        is_new_user: output.is_new_user,
        tokens: output.tokens,
    }))
}
