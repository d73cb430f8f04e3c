//! API-side authorization guard for protected operations.
//!
//! Enforced before the operation runs; the facade itself never re-checks.

use axum::response::Response;

use sentinel_auth::{ProtectedOperation, UserWithRole};

use crate::app::errors;
use crate::context::CallerContext;

/// Check the caller against the operation's required permission.
///
/// Denials carry a generic body that never names the missing claim.
pub fn authorize<O: ProtectedOperation>(caller: &CallerContext, operation: &O) -> Result<(), Response> {
    let decision = caller.principal().authorize(operation.required_permission());
    if decision.is_granted() {
        Ok(())
    } else {
        Err(errors::forbidden())
    }
}

/// The caller's provisioned user; callers that never logged in get 404.
pub fn require_user(caller: &CallerContext) -> Result<&UserWithRole, Response> {
    caller
        .user()
        .ok_or_else(errors::not_found)
}
