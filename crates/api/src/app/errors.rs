use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use sentinel_auth::AuthnError;
use sentinel_infra::{
    AccessError, ChainVerificationError, ProvisioningError, RoleAssignmentError, StoreError,
};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Generic refusal. Never says which permission was missing.
pub fn forbidden() -> axum::response::Response {
    json_error(StatusCode::FORBIDDEN, "forbidden", "access denied")
}

pub fn not_found() -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", "not found")
}

pub fn access_error_to_response(err: AccessError) -> axum::response::Response {
    if err.is_configuration_fault() {
        error!(error = %err, "authentication misconfigured");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "configuration_fault", "server misconfigured");
    }
    match err {
        AccessError::Authentication(AuthnError::MissingCredential) => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "missing bearer credential")
        }
        AccessError::Authentication(_) | AccessError::Resolution(_) => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "invalid credential")
        }
        AccessError::Store(e) => store_error_to_response(e),
    }
}

pub fn provisioning_error_to_response(err: ProvisioningError) -> axum::response::Response {
    match err {
        ProvisioningError::Invalid(e) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        ProvisioningError::MissingDefaultRole(role) => {
            error!(role, "default role missing; cannot provision users");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "configuration_fault", "server misconfigured")
        }
        ProvisioningError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ProvisioningError::Store(e) => store_error_to_response(e),
    }
}

pub fn role_assignment_error_to_response(err: RoleAssignmentError) -> axum::response::Response {
    match err {
        RoleAssignmentError::UserNotFound(_)
        | RoleAssignmentError::RoleNotFound(_)
        | RoleAssignmentError::AuthorNotFound(_) => not_found(),
        RoleAssignmentError::Persistence(e) => store_error_to_response(e),
    }
}

pub fn chain_error_to_response(err: ChainVerificationError) -> axum::response::Response {
    match err {
        ChainVerificationError::Store(e) => store_error_to_response(e),
        ChainVerificationError::Broken(e) => {
            json_error(StatusCode::CONFLICT, "audit_chain_broken", e.to_string())
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::NotFound(_) => not_found(),
        other => {
            error!(error = %other, "identity store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal error")
        }
    }
}
