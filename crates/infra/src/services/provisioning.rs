//! Create-or-update of internal users on every successful authentication.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use sentinel_auth::{ExternalIdentity, NewUser, UserWithRole, builtin};
use sentinel_core::{Clock, DomainError, UserId};

use super::recorder::SecurityEventRecorder;
use crate::identity_store::{SharedStore, StoreError};

/// Identity data taken from a validated principal.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub external_id: String,
    pub name: String,
    pub provider: String,
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid login: {0}")]
    Invalid(#[from] DomainError),

    /// Seed data is missing. Fatal: no user can be created without a role.
    #[error("configuration fault: default role '{0}' is missing")]
    MissingDefaultRole(&'static str),

    /// The email belongs to a different identity.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ProvisioningError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ProvisioningError::Conflict(msg),
            other => ProvisioningError::Store(other),
        }
    }
}

impl ProvisioningError {
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, ProvisioningError::MissingDefaultRole(_))
    }
}

#[derive(Clone)]
pub struct UserProvisioner {
    store: SharedStore,
    recorder: SecurityEventRecorder,
    clock: Arc<dyn Clock>,
}

impl UserProvisioner {
    pub fn new(store: SharedStore, recorder: SecurityEventRecorder, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            recorder,
            clock,
        }
    }

    /// Idempotent on `(provider, external_id)`.
    ///
    /// A returning user only gets `last_login_at` refreshed; email and name
    /// stay as first recorded. A lost first-login race is retried as an update.
    #[instrument(skip(self, request), fields(provider = %request.provider), err)]
    pub async fn login(&self, request: LoginRequest) -> Result<UserWithRole, ProvisioningError> {
        let identity = ExternalIdentity::new(&request.provider, request.external_id.trim());
        let new_user = NewUser::new(identity, &request.email, &request.name)?;
        let now = self.clock.now();

        if let Some(existing) = self.store.find_user_by_identity(&new_user.identity).await? {
            return self.refresh(existing, now).await;
        }

        let role = self
            .store
            .find_role_by_name(builtin::BASIC_USER)
            .await?
            .ok_or_else(|| {
                error!(role = builtin::BASIC_USER, "default role missing from identity store");
                ProvisioningError::MissingDefaultRole(builtin::BASIC_USER)
            })?;

        let identity = new_user.identity.clone();
        let user = new_user.into_user(UserId::new(), role.id, now);
        match self.store.insert_user(&user).await {
            Ok(()) => {
                info!(user_id = %user.id, "provisioned new user");
                self.recorder
                    .record_login(user.id, &user.identity.provider)
                    .await?;
                Ok(UserWithRole { user, role })
            }
            Err(StoreError::Conflict(msg)) => {
                debug!(reason = %msg, "first-login insert lost a race; retrying as update");
                match self.store.find_user_by_identity(&identity).await? {
                    Some(existing) => self.refresh(existing, now).await,
                    None => Err(ProvisioningError::Conflict(
                        "email already registered to another identity".to_string(),
                    )),
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn refresh(
        &self,
        mut existing: UserWithRole,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<UserWithRole, ProvisioningError> {
        self.store.touch_last_login(existing.user.id, now).await?;
        existing.user.touch_login(now);
        self.recorder
            .record_login(existing.user.id, &existing.user.identity.provider)
            .await?;
        Ok(existing)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::identity_store::{IdentityStore, InMemoryIdentityStore};
    use crate::seed::BASIC_USER_ID;
    use crate::services::testing::{as_clock, clock, seeded_store};
    use sentinel_auth::{EventCategory, SecurityEventType};

    fn request(external_id: &str, email: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            external_id: external_id.to_string(),
            name: "Alice".to_string(),
            provider: "okta".to_string(),
        }
    }

    fn provisioner(store: SharedStore, clock: Arc<dyn Clock>) -> UserProvisioner {
        let recorder = SecurityEventRecorder::new(store.clone(), clock.clone());
        UserProvisioner::new(store, recorder, clock)
    }

    #[tokio::test]
    async fn first_login_creates_basic_user_and_records_event() {
        let store = seeded_store().await;
        let p = provisioner(store.clone(), as_clock(&clock()));

        let u = p.login(request("00u1", "Alice@Example.com")).await.unwrap();
        assert_eq!(u.role.id, BASIC_USER_ID);
        assert_eq!(u.user.email, "alice@example.com");

        let events = store.list_events(EventCategory::Auth).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::LoginSuccess);
        assert_eq!(events[0].details, "provider=okta");
    }

    #[tokio::test]
    async fn repeat_login_is_idempotent_and_only_refreshes_last_login() {
        let store = seeded_store().await;
        let clock = clock();
        let p = provisioner(store.clone(), as_clock(&clock));

        let first = p.login(request("00u1", "alice@example.com")).await.unwrap();
        clock.advance(Duration::minutes(5));
        let mut again = request("00u1", "changed@example.com");
        again.name = "Someone Else".to_string();
        let second = p.login(again).await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert!(second.user.last_login_at > first.user.last_login_at);
        assert_eq!(second.user.email, "alice@example.com");
        assert_eq!(second.user.name, "Alice");

        let stored = store.find_user(first.user.id).await.unwrap().unwrap();
        assert_eq!(stored.user.last_login_at, second.user.last_login_at);
        assert_eq!(store.list_events(EventCategory::Auth).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn same_subject_from_two_providers_stays_separate() {
        let store = seeded_store().await;
        let p = provisioner(store.clone(), as_clock(&clock()));

        let okta = p.login(request("shared", "a@example.com")).await.unwrap();
        let mut ms = request("shared", "b@example.com");
        ms.provider = "microsoft".to_string();
        let ms = p.login(ms).await.unwrap();

        assert_ne!(okta.user.id, ms.user.id);
    }

    #[tokio::test]
    async fn email_owned_by_other_identity_conflicts() {
        let store = seeded_store().await;
        let p = provisioner(store.clone(), as_clock(&clock()));

        p.login(request("00u1", "a@example.com")).await.unwrap();
        let err = p.login(request("00u2", "a@example.com")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::Conflict(_)));
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_default_role_is_a_configuration_fault() {
        let store: SharedStore = Arc::new(InMemoryIdentityStore::new());
        let p = provisioner(store.clone(), as_clock(&clock()));

        let err = p.login(request("00u1", "a@example.com")).await.unwrap_err();
        assert!(err.is_configuration_fault());
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_first_logins_converge_on_one_user() {
        let store = seeded_store().await;
        let p = provisioner(store.clone(), as_clock(&clock()));

        let (a, b) = tokio::join!(
            p.login(request("00u1", "a@example.com")),
            p.login(request("00u1", "a@example.com"))
        );
        assert_eq!(a.unwrap().user.id, b.unwrap().user.id);
        assert_eq!(store.list_users().await.unwrap().len(), 1);
        assert_eq!(store.list_events(EventCategory::Auth).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_write() {
        let store = seeded_store().await;
        let p = provisioner(store.clone(), as_clock(&clock()));

        let err = p.login(request("  ", "a@example.com")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::Invalid(_)));
        let err = p.login(request("00u1", "not-an-email")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::Invalid(_)));
        assert!(store.list_users().await.unwrap().is_empty());
    }
}
