//! JWT claim types and validation.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
use serde::Serialize;
use uuid::Uuid;

use crm_domain::user::UserRole;

/// Discriminates access from refresh tokens. Carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test), derive(Serialize))]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Errors returned by token validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("unexpected token type")]
    WrongType,
}

/// Claims of a short-lived access token.
///
/// | Field | JWT claim | Meaning |
/// |-------|-----------|---------|
/// | `sub` | `sub` | user ID (UUID string) |
/// | `phone` | custom | normalized phone |
/// | `role` | custom | [`UserRole`] wire string |
/// | `token_type` | `type` | always `"access"` |
/// | `iat` / `exp` | `iat` / `exp` | seconds since epoch |
///
/// [`Serialize`] requires the **`USE_ONLY_IN_AUTH_SERVICE`** feature; only the auth
/// service mints tokens.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test), derive(Serialize))]
pub struct AccessClaims {
    pub sub: String,
    pub phone: String,
    pub role: UserRole,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Claims of a long-lived refresh token. `sid` is the session id, fresh on every issuance.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test), derive(Serialize))]
pub struct RefreshClaims {
    pub sub: String,
    pub phone: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub sid: String,
    pub iat: u64,
    pub exp: u64,
}

trait Typed {
    fn token_type(&self) -> TokenType;
}

impl Typed for AccessClaims {
    fn token_type(&self) -> TokenType {
        self.token_type
    }
}

impl Typed for RefreshClaims {
    fn token_type(&self) -> TokenType {
        self.token_type
    }
}

/// Decode and validate a JWT, then check its `type` claim.
///
/// Validation: HS256, exp checked, required claims: `exp` + `sub`. The signature is
/// verified before expiry, so `Expired` always means a genuine token that ran out.
fn decode_jwt<T>(token: &str, secret: &str, expected: TokenType) -> Result<T, AuthError>
where
    T: DeserializeOwned + Typed,
{
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;
    validation.required_spec_claims.clear();
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<T>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => AuthError::InvalidSignature,
        _ => AuthError::Malformed,
    })?;

    if data.claims.token_type() != expected {
        return Err(AuthError::WrongType);
    }
    Ok(data.claims)
}

/// Identity carried by a validated access token.
#[derive(Debug, Clone)]
pub struct AccessTokenInfo {
    pub user_id: Uuid,
    pub phone: String,
    pub role: UserRole,
    pub exp: u64,
}

/// Validate an access token against the access secret.
///
/// Every CRM service calls this on protected requests. Refresh tokens are rejected
/// even if they happen to carry a valid signature.
pub fn validate_access_token(token: &str, secret: &str) -> Result<AccessTokenInfo, AuthError> {
    let claims: AccessClaims = decode_jwt(token, secret, TokenType::Access)?;
    let user_id = claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| AuthError::Malformed)?;
    Ok(AccessTokenInfo {
        user_id,
        phone: claims.phone,
        role: claims.role,
        exp: claims.exp,
    })
}

/// Validate a refresh token against the refresh secret.
///
/// Requires the `USE_ONLY_IN_AUTH_SERVICE` feature; refresh tokens are only ever
/// presented to the auth service.
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<RefreshClaims, AuthError> {
    decode_jwt(token, secret, TokenType::Refresh)
}
