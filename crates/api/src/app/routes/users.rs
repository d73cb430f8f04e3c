use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
};

use sentinel_core::UserId;
use sentinel_infra::{AuditOperation, SecurityAuditService};

use crate::app::{dto::AssignRoleRequest, errors};
use crate::authz;
use crate::context::CallerContext;

/// GET /users
pub async fn list_users(
    Extension(service): Extension<Arc<SecurityAuditService>>,
) -> axum::response::Response {
    match service.list_users().await {
        Ok(users) => (StatusCode::OK, Json(serde_json::json!({ "users": users }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /roles
pub async fn list_roles(
    Extension(service): Extension<Arc<SecurityAuditService>>,
) -> axum::response::Response {
    match service.list_roles().await {
        Ok(roles) => (StatusCode::OK, Json(serde_json::json!({ "roles": roles }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /users/:id/role - requires `Audit.RoleChanges`
pub async fn assign_role(
    Extension(service): Extension<Arc<SecurityAuditService>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<AssignRoleRequest>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&caller, &AuditOperation::AssignRole) {
        return resp;
    }
    let author = match authz::require_user(&caller) {
        Ok(user) => user.user.id,
        Err(resp) => return resp,
    };
    let user_id: UserId = match id.parse() {
        Ok(id) => id,
        Err(_) => return errors::not_found(),
    };

    match service.assign_role(user_id, body.role_id, author).await {
        Ok(assignment) => (StatusCode::OK, Json(assignment)).into_response(),
        Err(e) => errors::role_assignment_error_to_response(e),
    }
}
