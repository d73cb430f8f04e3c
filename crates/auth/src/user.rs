//! Internal user records.
//!
//! A user is keyed by the issuer-assigned subject *within* the issuing
//! provider, so the same subject from two providers never merges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentinel_core::{DomainError, DomainResult, Entity, RoleId, UserId};

use crate::roles::Role;

/// Issuer-scoped external identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub provider: String,
    pub subject: String,
}

impl ExternalIdentity {
    /// Providers are compared case-insensitively ("Okta" == "okta").
    pub fn new(provider: &str, subject: impl Into<String>) -> Self {
        Self {
            provider: normalize_provider(provider),
            subject: subject.into(),
        }
    }
}

pub fn normalize_provider(provider: &str) -> String {
    provider.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub identity: ExternalIdentity,
    pub email: String,
    pub name: String,
    /// Never absent: every user holds exactly one role.
    pub role_id: RoleId,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

impl User {
    /// Record a login. `last_login_at` never moves backwards.
    pub fn touch_login(&mut self, at: DateTime<Utc>) {
        if at > self.last_login_at {
            self.last_login_at = at;
        }
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}

/// Validated input for first-time provisioning.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub identity: ExternalIdentity,
    pub email: String,
    pub name: String,
}

impl NewUser {
    pub fn new(
        identity: ExternalIdentity,
        email: &str,
        name: &str,
    ) -> DomainResult<Self> {
        if identity.provider.is_empty() {
            return Err(DomainError::validation("provider cannot be empty"));
        }
        if identity.subject.trim().is_empty() {
            return Err(DomainError::validation("external id cannot be empty"));
        }

        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }

        // Display name falls back to the email when the issuer sent none.
        let name = match name.trim() {
            "" => email,
            n => n,
        };

        Ok(Self {
            identity,
            email: email.to_lowercase(),
            name: name.to_string(),
        })
    }

    pub fn into_user(self, id: UserId, role_id: RoleId, now: DateTime<Utc>) -> User {
        User {
            id,
            identity: self.identity,
            email: self.email,
            name: self.name,
            role_id,
            created_at: now,
            last_login_at: now,
        }
    }
}

/// A user with its role and the role's claims eagerly loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithRole {
    pub user: User,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_is_normalized() {
        let a = ExternalIdentity::new(" Okta ", "00u1");
        let b = ExternalIdentity::new("okta", "00u1");
        assert_eq!(a, b);
    }

    #[test]
    fn new_user_rejects_invalid_email() {
        let identity = ExternalIdentity::new("okta", "00u1");
        assert!(NewUser::new(identity.clone(), "not-an-email", "A").is_err());
        assert!(NewUser::new(identity, "   ", "A").is_err());
    }

    #[test]
    fn new_user_rejects_blank_subject() {
        let identity = ExternalIdentity::new("okta", "  ");
        assert!(NewUser::new(identity, "a@example.com", "A").is_err());
    }

    #[test]
    fn name_defaults_to_email() {
        let identity = ExternalIdentity::new("okta", "00u1");
        let new_user = NewUser::new(identity, "Alice@Example.com", "").unwrap();
        assert_eq!(new_user.email, "alice@example.com");
        assert_eq!(new_user.name, "Alice@Example.com");
    }

    #[test]
    fn touch_login_is_monotonic() {
        let now = Utc::now();
        let identity = ExternalIdentity::new("okta", "00u1");
        let mut user = NewUser::new(identity, "a@example.com", "A")
            .unwrap()
            .into_user(UserId::new(), RoleId::new(), now);

        user.touch_login(now - chrono::Duration::seconds(30));
        assert_eq!(user.last_login_at, now);

        user.touch_login(now + chrono::Duration::seconds(30));
        assert_eq!(user.last_login_at, now + chrono::Duration::seconds(30));
    }
}
