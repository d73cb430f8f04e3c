use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use sentinel_auth::{
    EventCategory, ExternalIdentity, NewSecurityEvent, Role, SecurityEvent, User, UserWithRole,
};
use sentinel_core::{RoleId, UserId};

use crate::seed::Seed;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness or compare-and-set check failed. Callers retry on the update path.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("referential integrity violation: {0}")]
    ForeignKey(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Atomic role reassignment.
///
/// Applied only if the user still holds `expected_role_id`; the role update and
/// the event append commit as one unit or not at all.
#[derive(Debug, Clone)]
pub struct RoleChange {
    pub user_id: UserId,
    pub expected_role_id: RoleId,
    pub new_role_id: RoleId,
    pub event: NewSecurityEvent,
}

/// Persistence for users, roles, claims and security events.
///
/// Security events are insert-only. The trait has no update or delete.
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    /// Idempotently install roles, claims and role-claim links.
    async fn apply_seed(&self, seed: &Seed) -> Result<(), StoreError>;

    /// Load a user with its role and the role's claims in one read.
    async fn find_user(&self, id: UserId) -> Result<Option<UserWithRole>, StoreError>;

    async fn find_user_by_identity(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<Option<UserWithRole>, StoreError>;

    /// Insert a new user. `Conflict` on a duplicate identity or email,
    /// `ForeignKey` if the role does not exist.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Raise `last_login_at` to `at` (never lowers it).
    async fn touch_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    /// Compare-and-set the user's role and append the audit event atomically.
    ///
    /// `NotFound` if the user is gone, `Conflict` if the role moved underneath.
    async fn change_role(&self, change: RoleChange) -> Result<SecurityEvent, StoreError>;

    /// Append one event, assigning its sequence and chain hash.
    async fn append_event(&self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError>;

    /// Events in `category`, most recent first.
    async fn list_events(&self, category: EventCategory) -> Result<Vec<SecurityEvent>, StoreError>;

    /// Every event in ascending sequence order.
    async fn load_chain(&self) -> Result<Vec<SecurityEvent>, StoreError>;
}

pub type SharedStore = Arc<dyn IdentityStore>;

#[async_trait::async_trait]
impl<S> IdentityStore for Arc<S>
where
    S: IdentityStore + ?Sized,
{
    async fn apply_seed(&self, seed: &Seed) -> Result<(), StoreError> {
        (**self).apply_seed(seed).await
    }

    async fn find_user(&self, id: UserId) -> Result<Option<UserWithRole>, StoreError> {
        (**self).find_user(id).await
    }

    async fn find_user_by_identity(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<Option<UserWithRole>, StoreError> {
        (**self).find_user_by_identity(identity).await
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        (**self).insert_user(user).await
    }

    async fn touch_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).touch_last_login(id, at).await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        (**self).list_users().await
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        (**self).find_role(id).await
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        (**self).find_role_by_name(name).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        (**self).list_roles().await
    }

    async fn change_role(&self, change: RoleChange) -> Result<SecurityEvent, StoreError> {
        (**self).change_role(change).await
    }

    async fn append_event(&self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError> {
        (**self).append_event(event).await
    }

    async fn list_events(&self, category: EventCategory) -> Result<Vec<SecurityEvent>, StoreError> {
        (**self).list_events(category).await
    }

    async fn load_chain(&self) -> Result<Vec<SecurityEvent>, StoreError> {
        (**self).load_chain().await
    }
}
