use axum::{
    Json, Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crm_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    health::{healthz, readyz},
    otp::{request_otp, verify_otp},
    session::{check, list_permissions, me},
    token::{logout, refresh_token},
};
use crate::middleware::limit_by_client;
use crate::state::AppState;

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "kind": "NOT_FOUND", "message": "not found" })),
    )
}

pub fn build_router(state: AppState) -> Router {
    let auth = Router::new()
        // OTP login
        .route("/auth/otp", post(request_otp))
        .route("/auth/otp/verify", post(verify_otp))
        // Session
        .route("/auth/token/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        // Identity and permissions
        .route("/auth/me", get(me))
        .route("/auth/check", get(check))
        .route("/auth/permissions", get(list_permissions))
        .route_layer(from_fn_with_state(state.api_limiter.clone(), limit_by_client));

    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(auth)
        .fallback(not_found)
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
