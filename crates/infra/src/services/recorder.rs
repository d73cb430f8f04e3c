//! Append-only write path and category-filtered read path over the audit log.

use std::sync::Arc;

use tracing::{info, instrument};

use sentinel_auth::{EventCategory, NewSecurityEvent, Role, SecurityEvent};
use sentinel_core::{Clock, UserId};

use super::summaries::{Directory, SecurityEventRecord};
use crate::identity_store::{SharedStore, StoreError};

#[derive(Clone)]
pub struct SecurityEventRecorder {
    store: SharedStore,
    clock: Arc<dyn Clock>,
}

impl SecurityEventRecorder {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn record_login(
        &self,
        user_id: UserId,
        provider: &str,
    ) -> Result<SecurityEvent, StoreError> {
        let event = NewSecurityEvent::login_success(user_id, provider, self.clock.now());
        self.append(event).await
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn record_logout(&self, user_id: UserId) -> Result<SecurityEvent, StoreError> {
        let event = NewSecurityEvent::logout(user_id, self.clock.now());
        self.append(event).await
    }

    /// Record a role change that was applied elsewhere.
    ///
    /// Role changes made through `RoleAssignmentEngine` already commit their
    /// event together with the update and must not call this.
    #[instrument(skip(self, from, to), fields(author = %author_user_id, affected = %affected_user_id), err)]
    pub async fn record_role_assigned(
        &self,
        author_user_id: UserId,
        affected_user_id: UserId,
        from: &Role,
        to: &Role,
    ) -> Result<SecurityEvent, StoreError> {
        let event = NewSecurityEvent::role_assigned(
            author_user_id,
            affected_user_id,
            from,
            to,
            self.clock.now(),
        );
        self.append(event).await
    }

    pub async fn all_events(&self) -> Result<Vec<SecurityEventRecord>, StoreError> {
        self.list(EventCategory::All).await
    }

    /// Login and logout events.
    pub async fn auth_events(&self) -> Result<Vec<SecurityEventRecord>, StoreError> {
        self.list(EventCategory::Auth).await
    }

    pub async fn role_events(&self) -> Result<Vec<SecurityEventRecord>, StoreError> {
        self.list(EventCategory::RoleChanges).await
    }

    /// Most recent first, with author and affected users resolved.
    #[instrument(skip(self), err)]
    pub async fn list(
        &self,
        category: EventCategory,
    ) -> Result<Vec<SecurityEventRecord>, StoreError> {
        let events = self.store.list_events(category).await?;
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let users = self.store.list_users().await?;
        let roles = self.store.list_roles().await?;
        let directory = Directory::new(&users, roles);
        Ok(events.into_iter().map(|e| directory.record(e)).collect())
    }

    async fn append(&self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError> {
        let stored = self.store.append_event(event).await?;
        info!(
            event_type = %stored.event_type,
            sequence = stored.sequence,
            affected_user_id = %stored.affected_user_id,
            "security event recorded"
        );
        Ok(stored)
    }
}
