//! Role changes as a single unit of work with their audit record.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use sentinel_auth::{NewSecurityEvent, SecurityEvent};
use sentinel_core::{Clock, RoleId, UserId};

use crate::identity_store::{RoleChange, SharedStore, StoreError};

/// Attempts before a persistent compare-and-set conflict is reported.
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum RoleAssignmentError {
    #[error("user not found")]
    UserNotFound(UserId),

    #[error("role not found")]
    RoleNotFound(RoleId),

    #[error("author not found")]
    AuthorNotFound(UserId),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub previous_role_id: RoleId,
    pub new_role_id: RoleId,
    pub event: SecurityEvent,
}

/// Not reachable from transport without `Audit.RoleChanges`; the caller checks it.
#[derive(Clone)]
pub struct RoleAssignmentEngine {
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl RoleAssignmentEngine {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Move `user_id` to `role_id`, recording `RoleAssigned` in the same commit.
    ///
    /// On any error the user's role is unchanged and no event exists.
    #[instrument(skip(self), fields(user_id = %user_id, role_id = %role_id, author = %author_user_id), err)]
    pub async fn assign(
        &self,
        user_id: UserId,
        role_id: RoleId,
        author_user_id: UserId,
    ) -> Result<RoleAssignment, RoleAssignmentError> {
        if self.store.find_user(author_user_id).await?.is_none() {
            return Err(RoleAssignmentError::AuthorNotFound(author_user_id));
        }
        let mut last_conflict = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let current = self
                .store
                .find_user(user_id)
                .await?
                .ok_or(RoleAssignmentError::UserNotFound(user_id))?;
            let new_role = self
                .store
                .find_role(role_id)
                .await?
                .ok_or(RoleAssignmentError::RoleNotFound(role_id))?;

            let previous = current.role;
            let change = RoleChange {
                user_id,
                expected_role_id: previous.id,
                new_role_id: new_role.id,
                event: NewSecurityEvent::role_assigned(
                    author_user_id,
                    user_id,
                    &previous,
                    &new_role,
                    self.clock.now(),
                ),
            };

            match self.store.change_role(change).await {
                Ok(event) => {
                    info!(from = %previous.name, to = %new_role.name, "role assigned");
                    return Ok(RoleAssignment {
                        user_id,
                        previous_role_id: previous.id,
                        new_role_id: new_role.id,
                        event,
                    });
                }
                Err(StoreError::Conflict(msg)) => {
                    warn!(attempt, reason = %msg, "role changed concurrently; retrying");
                    last_conflict = Some(StoreError::Conflict(msg));
                }
                Err(StoreError::NotFound(_)) => {
                    return Err(RoleAssignmentError::UserNotFound(user_id));
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(RoleAssignmentError::Persistence(last_conflict.unwrap_or_else(|| {
            StoreError::Conflict("role assignment retries exhausted".to_string())
        })))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::identity_store::IdentityStore;
    use crate::seed::{AUTH_OBSERVER_ID, BASIC_USER_ID, SECURITY_AUDITOR_ID};
    use crate::services::testing::{as_clock, clock, seeded_store};
    use sentinel_auth::{EventCategory, ExternalIdentity, SecurityEventType, User};

    async fn insert_user(store: &SharedStore, subject: &str, role_id: RoleId) -> UserId {
        let user = User {
            id: UserId::new(),
            identity: ExternalIdentity::new("okta", subject),
            email: format!("{subject}@example.com"),
            name: subject.to_string(),
            role_id,
            created_at: Utc::now(),
            last_login_at: Utc::now(),
        };
        store.insert_user(&user).await.unwrap();
        user.id
    }

    #[tokio::test]
    async fn successful_assignment_writes_role_and_exactly_one_event() {
        let store = seeded_store().await;
        let engine = RoleAssignmentEngine::new(store.clone(), as_clock(&clock()));
        let admin = insert_user(&store, "admin", SECURITY_AUDITOR_ID).await;
        let target = insert_user(&store, "target", BASIC_USER_ID).await;

        let assignment = engine.assign(target, AUTH_OBSERVER_ID, admin).await.unwrap();
        assert_eq!(assignment.previous_role_id, BASIC_USER_ID);
        assert_eq!(assignment.new_role_id, AUTH_OBSERVER_ID);

        let events = store.list_events(EventCategory::RoleChanges).await.unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.event_type, SecurityEventType::RoleAssigned);
        assert_eq!(e.previous_role_id, Some(BASIC_USER_ID));
        assert_eq!(e.new_role_id, Some(AUTH_OBSERVER_ID));
        assert_eq!(e.author_user_id, admin);
        assert_eq!(e.affected_user_id, target);
        assert_eq!(e.details, "from=BasicUser to=AuthObserver");

        let reloaded = store.find_user(target).await.unwrap().unwrap();
        assert_eq!(reloaded.user.role_id, AUTH_OBSERVER_ID);
    }

    #[tokio::test]
    async fn unknown_role_leaves_user_and_log_untouched() {
        let store = seeded_store().await;
        let engine = RoleAssignmentEngine::new(store.clone(), as_clock(&clock()));
        let admin = insert_user(&store, "admin", SECURITY_AUDITOR_ID).await;
        let target = insert_user(&store, "target", BASIC_USER_ID).await;

        let missing = RoleId::new();
        let err = engine.assign(target, missing, admin).await.unwrap_err();
        assert!(matches!(err, RoleAssignmentError::RoleNotFound(id) if id == missing));

        let reloaded = store.find_user(target).await.unwrap().unwrap();
        assert_eq!(reloaded.user.role_id, BASIC_USER_ID);
        assert!(store.load_chain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_distinguished_from_unknown_role() {
        let store = seeded_store().await;
        let engine = RoleAssignmentEngine::new(store.clone(), as_clock(&clock()));
        let admin = insert_user(&store, "admin", SECURITY_AUDITOR_ID).await;

        let err = engine.assign(UserId::new(), AUTH_OBSERVER_ID, admin).await.unwrap_err();
        assert!(matches!(err, RoleAssignmentError::UserNotFound(_)));
        assert!(store.load_chain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_author_fails_without_partial_write() {
        let store = seeded_store().await;
        let engine = RoleAssignmentEngine::new(store.clone(), as_clock(&clock()));
        let target = insert_user(&store, "target", BASIC_USER_ID).await;

        let err = engine.assign(target, AUTH_OBSERVER_ID, UserId::new()).await.unwrap_err();
        assert!(matches!(err, RoleAssignmentError::AuthorNotFound(_)), "{err:?}");

        let reloaded = store.find_user(target).await.unwrap().unwrap();
        assert_eq!(reloaded.user.role_id, BASIC_USER_ID);
        assert!(store.load_chain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn consecutive_assignments_chain_previous_roles() {
        let store = seeded_store().await;
        let engine = RoleAssignmentEngine::new(store.clone(), as_clock(&clock()));
        let admin = insert_user(&store, "admin", SECURITY_AUDITOR_ID).await;
        let target = insert_user(&store, "target", BASIC_USER_ID).await;

        engine.assign(target, AUTH_OBSERVER_ID, admin).await.unwrap();
        let second = engine.assign(target, SECURITY_AUDITOR_ID, admin).await.unwrap();
        assert_eq!(second.previous_role_id, AUTH_OBSERVER_ID);
        assert_eq!(second.event.sequence, 2);
    }
}
