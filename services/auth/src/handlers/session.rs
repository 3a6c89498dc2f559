use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crm_auth_types::gate::{Requirement, authorize};
use crm_auth_types::identity::Identity;
use crm_domain::permission::{Permission, list_all_permissions};
use crm_domain::user::UserRole;

use crate::error::AuthServiceError;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub user_id: Uuid,
    pub phone: String,
    pub role: UserRole,
    pub permissions: Vec<&'static str>,
    pub access_token_exp: u64,
}

impl IdentityResponse {
    fn new(identity: Identity, state: &AppState) -> Self {
        let mut permissions: Vec<&'static str> = state
            .roles
            .permissions_of(identity.role)
            .map(Permission::as_str)
            .collect();
        permissions.sort_unstable();
        Self {
            user_id: identity.user_id,
            phone: identity.phone,
            role: identity.role,
            permissions,
            access_token_exp: identity.access_token_exp,
        }
    }
}

// ── GET /auth/me ──────────────────────────────────────────────────────────────

pub async fn me(State(state): State<AppState>, identity: Identity) -> impl IntoResponse {
    Json(IdentityResponse::new(identity, &state))
}

// ── GET /auth/check ───────────────────────────────────────────────────────────

/// Comma-separated lists. `permission` requires all, `anyPermission` at least one,
/// `role` one of the listed roles. Every given parameter must pass.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuery {
    pub permission: Option<String>,
    pub any_permission: Option<String>,
    pub role: Option<String>,
}

/// Parse a comma separated list. An empty list is rejected so that a blank
/// requirement can never pass the gate.
fn split_list<T: std::str::FromStr>(name: &str, raw: &str) -> Result<Vec<T>, AuthServiceError>
where
    T::Err: std::fmt::Display,
{
    let items = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| AuthServiceError::Validation(e.to_string()))
        })
        .collect::<Result<Vec<T>, _>>()?;
    if items.is_empty() {
        return Err(AuthServiceError::Validation(format!("{name} must not be empty")));
    }
    Ok(items)
}

impl CheckQuery {
    pub fn requirements(&self) -> Result<Vec<Requirement>, AuthServiceError> {
        let mut requirements = Vec::new();
        if let Some(raw) = &self.permission {
            requirements.push(Requirement::AllOf(split_list("permission", raw)?));
        }
        if let Some(raw) = &self.any_permission {
            requirements.push(Requirement::AnyOf(split_list("anyPermission", raw)?));
        }
        if let Some(raw) = &self.role {
            requirements.push(Requirement::Role(split_list("role", raw)?));
        }
        Ok(requirements)
    }
}

pub async fn check(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<CheckQuery>,
) -> Result<impl IntoResponse, AuthServiceError> {
    for requirement in query.requirements()? {
        authorize(&state.roles, &identity, &requirement)?;
    }
    Ok(Json(IdentityResponse::new(identity, &state)))
}

// ── GET /auth/permissions ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PermissionsResponse {
    pub permissions: Vec<&'static str>,
}

pub async fn list_permissions(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse, AuthServiceError> {
    authorize(
        &state.roles,
        &identity,
        &Requirement::Permission(Permission::PermissionsRead),
    )?;
    Ok(Json(PermissionsResponse {
        permissions: list_all_permissions(&state.roles),
    }))
}
