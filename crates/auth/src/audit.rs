//! Security event model (append-only audit records).

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentinel_core::{DomainError, RoleId, SecurityEventId, UserId};

use crate::roles::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SecurityEventType {
    LoginSuccess,
    Logout,
    RoleAssigned,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::LoginSuccess => "LoginSuccess",
            SecurityEventType::Logout => "Logout",
            SecurityEventType::RoleAssigned => "RoleAssigned",
        }
    }
}

impl core::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LoginSuccess" => Ok(SecurityEventType::LoginSuccess),
            "Logout" => Ok(SecurityEventType::Logout),
            "RoleAssigned" => Ok(SecurityEventType::RoleAssigned),
            other => Err(DomainError::validation(format!("unknown event type '{other}'"))),
        }
    }
}

/// Read-side event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    All,
    /// Login and logout.
    Auth,
    /// Role assignments.
    RoleChanges,
}

impl EventCategory {
    pub fn event_types(&self) -> &'static [SecurityEventType] {
        match self {
            EventCategory::All => &[
                SecurityEventType::LoginSuccess,
                SecurityEventType::Logout,
                SecurityEventType::RoleAssigned,
            ],
            EventCategory::Auth => &[SecurityEventType::LoginSuccess, SecurityEventType::Logout],
            EventCategory::RoleChanges => &[SecurityEventType::RoleAssigned],
        }
    }

    pub fn includes(&self, event_type: SecurityEventType) -> bool {
        self.event_types().contains(&event_type)
    }
}

/// An event about to be appended. The store assigns id, sequence and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSecurityEvent {
    pub event_type: SecurityEventType,
    pub author_user_id: UserId,
    pub affected_user_id: UserId,
    pub occurred_utc: DateTime<Utc>,
    pub details: String,
    pub previous_role_id: Option<RoleId>,
    pub new_role_id: Option<RoleId>,
}

impl NewSecurityEvent {
    pub fn login_success(user_id: UserId, provider: &str, at: DateTime<Utc>) -> Self {
        Self {
            event_type: SecurityEventType::LoginSuccess,
            author_user_id: user_id,
            affected_user_id: user_id,
            occurred_utc: at,
            details: format!("provider={provider}"),
            previous_role_id: None,
            new_role_id: None,
        }
    }

    pub fn logout(user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            event_type: SecurityEventType::Logout,
            author_user_id: user_id,
            affected_user_id: user_id,
            occurred_utc: at,
            details: "local sign-out".to_string(),
            previous_role_id: None,
            new_role_id: None,
        }
    }

    pub fn role_assigned(
        author_user_id: UserId,
        affected_user_id: UserId,
        from: &Role,
        to: &Role,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: SecurityEventType::RoleAssigned,
            author_user_id,
            affected_user_id,
            occurred_utc: at,
            details: format!("from={} to={}", from.name, to.name),
            previous_role_id: Some(from.id),
            new_role_id: Some(to.id),
        }
    }
}

/// A committed audit record. Never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: SecurityEventId,
    /// Store-assigned, strictly increasing from 1 without gaps.
    pub sequence: u64,
    pub event_type: SecurityEventType,
    pub author_user_id: UserId,
    pub affected_user_id: UserId,
    pub occurred_utc: DateTime<Utc>,
    pub details: String,
    pub previous_role_id: Option<RoleId>,
    pub new_role_id: Option<RoleId>,
    /// Hex SHA-256 linking this record to its predecessor.
    pub chain_hash: String,
}

/// Most recent first; ties broken by sequence so the order is total.
pub fn sort_descending(events: &mut [SecurityEvent]) {
    events.sort_by(|a, b| {
        b.occurred_utc
            .cmp(&a.occurred_utc)
            .then(b.sequence.cmp(&a.sequence))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_text() {
        for t in EventCategory::All.event_types() {
            assert_eq!(t.as_str().parse::<SecurityEventType>().unwrap(), *t);
        }
        assert!("PasswordReset".parse::<SecurityEventType>().is_err());
    }

    #[test]
    fn categories_partition_types() {
        assert!(EventCategory::Auth.includes(SecurityEventType::Logout));
        assert!(!EventCategory::Auth.includes(SecurityEventType::RoleAssigned));
        assert!(EventCategory::RoleChanges.includes(SecurityEventType::RoleAssigned));
        assert!(!EventCategory::RoleChanges.includes(SecurityEventType::LoginSuccess));
    }

    #[test]
    fn details_follow_audit_conventions() {
        let u = UserId::new();
        let now = Utc::now();
        assert_eq!(NewSecurityEvent::login_success(u, "okta", now).details, "provider=okta");
        assert_eq!(NewSecurityEvent::logout(u, now).details, "local sign-out");

        let from = Role::new(RoleId::new(), "BasicUser");
        let to = Role::new(RoleId::new(), "SecurityAuditor");
        let e = NewSecurityEvent::role_assigned(UserId::new(), u, &from, &to, now);
        assert_eq!(e.details, "from=BasicUser to=SecurityAuditor");
        assert_eq!(e.previous_role_id, Some(from.id));
        assert_eq!(e.new_role_id, Some(to.id));
        assert_eq!(e.affected_user_id, u);
    }
}
