use sentinel_auth::{Permission, ProtectedOperation};

/// Protected facade operations and the permission each one requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOperation {
    ListAuthEvents,
    ListRoleEvents,
    ListAllEvents,
    AssignRole,
}

impl ProtectedOperation for AuditOperation {
    fn required_permission(&self) -> &Permission {
        const VIEW_AUTH_EVENTS: &Permission = &Permission::VIEW_AUTH_EVENTS;
        const ROLE_CHANGES: &Permission = &Permission::ROLE_CHANGES;

        match self {
            AuditOperation::ListAuthEvents => VIEW_AUTH_EVENTS,
            AuditOperation::ListRoleEvents
            | AuditOperation::ListAllEvents
            | AuditOperation::AssignRole => ROLE_CHANGES,
        }
    }
}
