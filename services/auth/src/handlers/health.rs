use axum::{extract::State, http::StatusCode};

use crate::infra::db;
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// 200 once the database answers, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    match db::ping(&state.db).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = ?e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
