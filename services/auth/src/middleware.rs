use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crm_core::middleware::client_identity;

use crate::error::AuthServiceError;
use crate::usecase::ratelimit::MemoryRateLimiter;

const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Per-client fixed-window limit applied to every `/auth/*` request.
pub async fn limit_by_client(
    State(limiter): State<Arc<MemoryRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_identity(request.headers());
    let outcome = limiter.check(&client);
    if !outcome.allowed {
        tracing::warn!(%client, reset_at = %outcome.reset_at, "client rate limited");
        return AuthServiceError::RateLimitExceeded {
            remaining: 0,
            reset_at: outcome.reset_at,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        X_RATELIMIT_REMAINING,
        HeaderValue::from(outcome.remaining),
    );
    response
}
