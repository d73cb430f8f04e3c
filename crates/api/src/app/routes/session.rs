//! Login and logout for the authenticated caller.

use std::sync::Arc;

use axum::{Extension, Json, http::StatusCode, response::IntoResponse};

use sentinel_infra::{LoginRequest, SecurityAuditService, UserSummary};

use crate::app::errors;
use crate::authz;
use crate::context::CallerContext;

/// POST /session/login - provision or refresh the caller and record the login
pub async fn login(
    Extension(service): Extension<Arc<SecurityAuditService>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    let principal = caller.principal();
    let email = match principal.principal.require_email() {
        Ok(email) => email.to_string(),
        Err(_) => {
            return errors::json_error(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "credential carries no email claim",
            );
        }
    };

    let request = LoginRequest {
        name: principal.principal.name.clone().unwrap_or_else(|| email.clone()),
        email,
        external_id: principal.principal.external_id.clone(),
        provider: principal.provider.clone(),
    };

    match service.login(request).await {
        Ok(user) => (
            StatusCode::OK,
            Json(UserSummary::new(&user.user, Some(&user.role))),
        )
            .into_response(),
        Err(e) => errors::provisioning_error_to_response(e),
    }
}

/// POST /session/logout - record a local sign-out
pub async fn logout(
    Extension(service): Extension<Arc<SecurityAuditService>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    let user = match authz::require_user(&caller) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match service.logout(user.user.id).await {
        Ok(event) => (StatusCode::OK, Json(event)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
