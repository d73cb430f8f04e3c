//! Audit log read endpoints, newest first.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::Query,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use sentinel_auth::ChainHead;
use sentinel_infra::{AuditOperation, SecurityAuditService, SecurityEventRecord, StoreError};

use crate::app::{
    dto::{ChainStatus, PinnedHead},
    errors,
};
use crate::authz;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_all))
        .route("/auth", get(list_auth))
        .route("/roles", get(list_roles))
        .route("/verify", get(verify_chain))
}

fn respond(result: Result<Vec<SecurityEventRecord>, StoreError>) -> axum::response::Response {
    match result {
        Ok(events) => (StatusCode::OK, Json(serde_json::json!({ "events": events }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /events - requires `Audit.RoleChanges`
pub async fn list_all(
    Extension(service): Extension<Arc<SecurityAuditService>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&caller, &AuditOperation::ListAllEvents) {
        return resp;
    }
    respond(service.list_all_events().await)
}

/// GET /events/auth - requires `Audit.ViewAuthEvents`
pub async fn list_auth(
    Extension(service): Extension<Arc<SecurityAuditService>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&caller, &AuditOperation::ListAuthEvents) {
        return resp;
    }
    respond(service.list_auth_events().await)
}

/// GET /events/roles - requires `Audit.RoleChanges`
pub async fn list_roles(
    Extension(service): Extension<Arc<SecurityAuditService>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&caller, &AuditOperation::ListRoleEvents) {
        return resp;
    }
    respond(service.list_role_events().await)
}

/// GET /events/verify?sequence=&chain_hash= - re-hash the audit chain; same
/// guard as the full listing. The optional pin must match a stored record.
pub async fn verify_chain(
    Extension(service): Extension<Arc<SecurityAuditService>>,
    Extension(caller): Extension<CallerContext>,
    Query(pin): Query<PinnedHead>,
) -> axum::response::Response {
    if let Err(resp) = authz::authorize(&caller, &AuditOperation::ListAllEvents) {
        return resp;
    }
    let pinned = match (pin.sequence, pin.chain_hash) {
        (Some(sequence), Some(chain_hash)) => Some(ChainHead {
            sequence,
            chain_hash,
        }),
        (None, None) => None,
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_pin",
                "sequence and chain_hash must be given together",
            );
        }
    };
    match service.verify_audit_chain(pinned.as_ref()).await {
        Ok(head) => (
            StatusCode::OK,
            Json(ChainStatus {
                verified_events: head.sequence,
                head,
            }),
        )
            .into_response(),
        Err(e) => errors::chain_error_to_response(e),
    }
}
