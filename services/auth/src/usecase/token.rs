use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use crm_auth_types::token::{
    AccessClaims, AuthError, RefreshClaims, TokenType, validate_refresh_token,
};

use crate::config::TokenSettings;
use crate::domain::repository::UserRepository;
use crate::domain::types::{AuthUser, TokenPair};
use crate::error::AuthServiceError;

fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

fn sign<T: serde::Serialize>(claims: &T, secret: &str) -> Result<String, AuthServiceError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthServiceError::Internal(e.into()))
}

/// Mints and verifies session tokens. Access and refresh tokens use separate secrets.
#[derive(Clone)]
pub struct TokenIssuer {
    settings: TokenSettings,
}

impl TokenIssuer {
    pub fn new(settings: TokenSettings) -> Self {
        Self { settings }
    }

    pub fn access_secret(&self) -> &str {
        &self.settings.access_secret
    }

    /// Sign a fresh access/refresh pair under a new session id.
    pub fn mint(&self, user: &AuthUser) -> Result<TokenPair, AuthServiceError> {
        let now = now_secs();
        let expires_in = self.settings.access_ttl.as_secs();
        let refresh_expires_in = self.settings.refresh_ttl.as_secs();
        let session_id = Uuid::new_v4();

        let access = AccessClaims {
            sub: user.id.to_string(),
            phone: user.phone.to_string(),
            role: user.role,
            token_type: TokenType::Access,
            iat: now,
            exp: now + expires_in,
        };
        let refresh = RefreshClaims {
            sub: user.id.to_string(),
            phone: user.phone.to_string(),
            token_type: TokenType::Refresh,
            sid: session_id.to_string(),
            iat: now,
            exp: now + refresh_expires_in,
        };

        Ok(TokenPair {
            access_token: sign(&access, &self.settings.access_secret)?,
            refresh_token: sign(&refresh, &self.settings.refresh_secret)?,
            session_id,
            expires_in,
            refresh_expires_in,
            access_token_exp: access.exp,
        })
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthServiceError> {
        validate_refresh_token(token, &self.settings.refresh_secret).map_err(|e| match e {
            AuthError::Expired => AuthServiceError::TokenExpired,
            _ => AuthServiceError::InvalidToken,
        })
    }

    /// Mint a pair for a freshly authenticated user and record the login time.
    pub async fn issue_token_pair<U: UserRepository>(
        &self,
        users: &U,
        user: &AuthUser,
    ) -> Result<TokenPair, AuthServiceError> {
        let pair = self.mint(user)?;
        users.touch_last_login(user.id, Utc::now()).await?;
        tracing::info!(
            user_id = %user.id,
            session_id = %pair.session_id,
            role = %user.role,
            "session issued"
        );
        Ok(pair)
    }
}

// ── RefreshToken ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RefreshTokenOutput {
    pub user: AuthUser,
    pub tokens: TokenPair,
}

pub struct RefreshTokenUseCase<U: UserRepository> {
    pub users: U,
    pub issuer: TokenIssuer,
}

impl<U: UserRepository> RefreshTokenUseCase<U> {
    /// Exchange a refresh token for a new pair. The user is re-read so that
    /// deactivation and role changes take effect at the next refresh.
    pub async fn execute(&self, refresh_token: &str) -> Result<RefreshTokenOutput, AuthServiceError> {
        let claims = self.issuer.verify_refresh(refresh_token)?;
        let user_id: Uuid = claims
            .sub
            .parse()
            .map_err(|_| AuthServiceError::InvalidToken)?;

        let user = self
            .users
            .find_active_by_id(user_id)
            .await?
            .ok_or(AuthServiceError::UserNotFoundOrInactive)?;

        let tokens = self.issuer.mint(&user)?;
        tracing::info!(
            user_id = %user.id,
            previous_session = %claims.sid,
            session_id = %tokens.session_id,
            "session refreshed"
        );
        Ok(RefreshTokenOutput { user, tokens })
    }
}

// ── Logout ────────────────────────────────────────────────────────────────────

pub struct LogoutUseCase {
    pub issuer: TokenIssuer,
}

impl LogoutUseCase {
    /// Best-effort session end. Never fails: a missing or bad token is logged and ignored.
    /// Tokens stay valid until they expire, since no revocation list is kept.
    pub fn execute(&self, refresh_token: Option<&str>) {
        let Some(token) = refresh_token else {
            tracing::debug!("logout without refresh token");
            return;
        };
        match self.issuer.verify_refresh(token) {
            Ok(claims) => {
                tracing::info!(user_id = %claims.sub, session_id = %claims.sid, "session ended");
            }
            Err(e) => tracing::debug!(error = %e, "logout with unusable refresh token"),
        }
    }
}
