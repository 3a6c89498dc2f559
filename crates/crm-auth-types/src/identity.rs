//! Bearer-token identity extractor.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http::request::Parts;
use uuid::Uuid;

use crm_domain::user::UserRole;

use crate::token::{AuthError, validate_access_token};

/// Access-token signing secret, made available to [`Identity`] through `FromRef`.
#[derive(Clone)]
pub struct AccessTokenKey(Arc<str>);

impl AccessTokenKey {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self(secret.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Caller identity taken from a validated `Authorization: Bearer <access token>` header.
///
/// Rejects with 401 `INVALID_TOKEN` if the header is missing or the token does not
/// verify, and 401 `TOKEN_EXPIRED` if it verified but has expired.
/// Permission checks (403) happen after extraction, see [`crate::gate`].
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub phone: String,
    pub role: UserRole,
    pub access_token_exp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRejection {
    Invalid,
    Expired,
}

impl IdentityRejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invalid => "INVALID_TOKEN",
            Self::Expired => "TOKEN_EXPIRED",
        }
    }
}

impl IntoResponse for IdentityRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Invalid => "invalid token",
            Self::Expired => "token expired",
        };
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": message,
        });
        (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    AccessTokenKey: FromRef<S>,
{
    type Rejection = IdentityRejection;

    // Validation is synchronous; resolve it before building the future so the
    // returned future does not borrow `parts`.
    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let key = AccessTokenKey::from_ref(state);
        let result = match bearer_token(parts) {
            None => Err(IdentityRejection::Invalid),
            Some(token) => validate_access_token(token, key.as_str())
                .map(|info| Identity {
                    user_id: info.user_id,
                    phone: info.phone,
                    role: info.role,
                    access_token_exp: info.exp,
                })
                .map_err(|e| match e {
                    AuthError::Expired => IdentityRejection::Expired,
                    _ => IdentityRejection::Invalid,
                }),
        };

        async move { result }
    }
}
