//! Permission gate evaluated before a protected operation runs.

use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crm_domain::permission::{
    Permission, RolePermissions, has_all_permissions, has_any_permission, has_permission,
};
use crm_domain::user::UserRole;

use crate::identity::Identity;

/// What a protected operation demands of its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Permission(Permission),
    AnyOf(Vec<Permission>),
    AllOf(Vec<Permission>),
    Role(Vec<UserRole>),
}

impl Requirement {
    pub fn is_met(&self, table: &RolePermissions, role: UserRole) -> bool {
        match self {
            Self::Permission(p) => has_permission(table, role, *p),
            Self::AnyOf(ps) => has_any_permission(table, role, ps),
            Self::AllOf(ps) => has_all_permissions(table, role, ps),
            Self::Role(roles) => crm_domain::permission::has_role(role, roles),
        }
    }
}

/// The caller is authenticated but not allowed to perform the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("forbidden")]
pub struct Forbidden;

impl IntoResponse for Forbidden {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "kind": "FORBIDDEN",
            "message": self.to_string(),
        });
        (StatusCode::FORBIDDEN, axum::Json(body)).into_response()
    }
}

/// Check `requirement` for `identity`. Call before any side effect of the operation.
pub fn authorize(
    table: &RolePermissions,
    identity: &Identity,
    requirement: &Requirement,
) -> Result<(), Forbidden> {
    if requirement.is_met(table, identity.role) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %identity.user_id,
        role = %identity.role,
        requirement = ?requirement,
        "permission denied"
    );
    Err(Forbidden)
}
