//! Presentation projections returned by list operations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sentinel_auth::{Role, SecurityEvent, SecurityEventType, User};
use sentinel_core::{RoleId, SecurityEventId, UserId};

/// Shown when a user's role cannot be resolved.
pub const UNKNOWN_ROLE: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

impl UserSummary {
    pub fn new(user: &User, role: Option<&Role>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            provider: user.identity.provider.clone(),
            role: role.map_or_else(|| UNKNOWN_ROLE.to_string(), |r| r.name.clone()),
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub claims: Vec<String>,
}

impl From<&Role> for RoleSummary {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            description: role.description.clone(),
            claims: role.permission_values(),
        }
    }
}

/// An event with its author, subject and (for role changes) roles resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityEventRecord {
    pub id: SecurityEventId,
    pub sequence: u64,
    pub event_type: SecurityEventType,
    pub occurred_utc: DateTime<Utc>,
    pub details: String,
    pub author: Option<UserSummary>,
    pub affected: Option<UserSummary>,
    pub previous_role: Option<RoleSummary>,
    pub new_role: Option<RoleSummary>,
}

/// Users and roles indexed for resolving many events at once.
pub(crate) struct Directory {
    users: HashMap<UserId, UserSummary>,
    roles: HashMap<RoleId, Role>,
}

impl Directory {
    pub(crate) fn new(users: &[User], roles: Vec<Role>) -> Self {
        let roles: HashMap<RoleId, Role> = roles.into_iter().map(|r| (r.id, r)).collect();
        let users = users
            .iter()
            .map(|u| (u.id, UserSummary::new(u, roles.get(&u.role_id))))
            .collect();
        Self { users, roles }
    }

    pub(crate) fn record(&self, event: SecurityEvent) -> SecurityEventRecord {
        let role = |id: Option<RoleId>| id.and_then(|id| self.roles.get(&id)).map(RoleSummary::from);
        SecurityEventRecord {
            author: self.users.get(&event.author_user_id).cloned(),
            affected: self.users.get(&event.affected_user_id).cloned(),
            previous_role: role(event.previous_role_id),
            new_role: role(event.new_role_id),
            id: event.id,
            sequence: event.sequence,
            event_type: event.event_type,
            occurred_utc: event.occurred_utc,
            details: event.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_auth::ExternalIdentity;

    fn user(role_id: RoleId) -> User {
        User {
            id: UserId::new(),
            identity: ExternalIdentity::new("okta", "00u1"),
            email: "a@example.com".to_string(),
            name: "A".to_string(),
            role_id,
            created_at: Utc::now(),
            last_login_at: Utc::now(),
        }
    }

    #[test]
    fn unresolvable_role_renders_unknown() {
        let summary = UserSummary::new(&user(RoleId::new()), None);
        assert_eq!(summary.role, UNKNOWN_ROLE);
    }

    #[test]
    fn directory_resolves_users_and_roles() {
        let role = Role::new(RoleId::new(), "BasicUser");
        let u = user(role.id);
        let dir = Directory::new(std::slice::from_ref(&u), vec![role.clone()]);

        let event = sentinel_auth::seal(
            sentinel_auth::NewSecurityEvent::role_assigned(u.id, u.id, &role, &role, Utc::now()),
            SecurityEventId::new(),
            1,
            sentinel_auth::GENESIS_HASH,
        );
        let record = dir.record(event);
        assert_eq!(record.author.as_ref().map(|a| a.role.as_str()), Some("BasicUser"));
        assert_eq!(record.new_role.map(|r| r.name), Some("BasicUser".to_string()));
    }
}
