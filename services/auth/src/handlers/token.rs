use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::domain::types::TokenPair;
use crate::error::AuthServiceError;
use crate::state::AppState;
use crate::usecase::token::{LogoutUseCase, RefreshTokenUseCase};

// ── POST /auth/token/refresh ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub user_id: uuid::Uuid,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let Json(body) = payload?;
    let usecase = RefreshTokenUseCase {
        users: state.user_repo(),
        issuer: state.issuer.clone(),
    };
    let output = usecase.execute(&body.refresh_token).await?;
    Ok(Json(RefreshTokenResponse {
        user_id: output.user.id,
        tokens: output.tokens,
    }))
}

// ── POST /auth/logout ─────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// Always 204. The body is optional and may be malformed.
pub async fn logout(State(state): State<AppState>, body: axum::body::Bytes) -> StatusCode {
    let request: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    LogoutUseCase {
        issuer: state.issuer.clone(),
    }
    .execute(request.refresh_token.as_deref());
    StatusCode::NO_CONTENT
}
