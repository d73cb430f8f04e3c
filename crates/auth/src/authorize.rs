use serde::Serialize;

use crate::Permission;
use crate::user::UserWithRole;

/// Outcome of a permission check. Denial is a routine value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Grant,
    Deny,
}

impl Decision {
    pub fn is_granted(self) -> bool {
        matches!(self, Decision::Grant)
    }
}

/// Why a check denied. For logs only; never returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    UnknownUser,
    RoleHasNoClaims,
    MissingPermission,
}

/// Operation-side authorization contract.
///
/// Implement this on operations that require a permission. The transport
/// layer enforces it before the operation runs.
pub trait ProtectedOperation {
    fn required_permission(&self) -> &Permission;
}

/// Decide whether `subject` may perform an operation requiring `required`.
///
/// - No IO
/// - No panics
/// - Strict positive match on `(permissions, required)` over the subject's own role
pub fn evaluate(subject: Option<&UserWithRole>, required: &Permission) -> Decision {
    explain(subject, required).0
}

/// Same as [`evaluate`], with the denial reason attached.
pub fn explain(subject: Option<&UserWithRole>, required: &Permission) -> (Decision, Option<DenialKind>) {
    let Some(subject) = subject else {
        return (Decision::Deny, Some(DenialKind::UnknownUser));
    };

    if subject.role.claims.is_empty() {
        return (Decision::Deny, Some(DenialKind::RoleHasNoClaims));
    }

    if subject.role.grants(required) {
        (Decision::Grant, None)
    } else {
        (Decision::Deny, Some(DenialKind::MissingPermission))
    }
}
