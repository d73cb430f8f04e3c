//! `SecurityAuditService`: every operation the transport layer exposes.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument};

use sentinel_auth::{
    AuditChainError, ChainHead, Decision, IssuerRouter, Permission, PrincipalResolver, SecurityEvent,
    TokenVerifier, UserWithRole, verify_chain,
};
use sentinel_core::{Clock, RoleId, UserId};

use super::access::{AccessError, AccessGate, AuthenticatedPrincipal};
use super::provisioning::{LoginRequest, ProvisioningError, UserProvisioner};
use super::recorder::SecurityEventRecorder;
use super::role_assignment::{RoleAssignment, RoleAssignmentEngine, RoleAssignmentError};
use super::summaries::{RoleSummary, SecurityEventRecord, UserSummary};
use crate::identity_store::{SharedStore, StoreError};
use crate::seed::Seed;

#[derive(Debug, Error)]
pub enum ChainVerificationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("audit chain broken: {0}")]
    Broken(#[from] AuditChainError),
}

#[derive(Clone)]
pub struct SecurityAuditService {
    store: SharedStore,
    gate: AccessGate,
    recorder: SecurityEventRecorder,
    provisioner: UserProvisioner,
    roles: RoleAssignmentEngine,
}

impl SecurityAuditService {
    pub fn new(
        store: SharedStore,
        router: IssuerRouter,
        verifier: Arc<dyn TokenVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let recorder = SecurityEventRecorder::new(store.clone(), clock.clone());
        Self {
            gate: AccessGate::new(router, verifier, PrincipalResolver::new(), store.clone()),
            provisioner: UserProvisioner::new(store.clone(), recorder.clone(), clock.clone()),
            roles: RoleAssignmentEngine::new(store.clone(), clock),
            recorder,
            store,
        }
    }

    /// Install the built-in roles and claims. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.store.apply_seed(&Seed::builtin()).await.map_err(|e| {
            error!(error = %e, "failed to seed identity store");
            e
        })?;
        info!("identity store seeded");
        Ok(())
    }

    pub async fn resolve_and_authorize(
        &self,
        credential: Option<&str>,
        required: &Permission,
    ) -> Result<Decision, AccessError> {
        self.gate.resolve_and_authorize(credential, required).await
    }

    pub async fn authenticate(
        &self,
        credential: Option<&str>,
    ) -> Result<AuthenticatedPrincipal, AccessError> {
        self.gate.authenticate(credential).await
    }

    pub async fn login(&self, request: LoginRequest) -> Result<UserWithRole, ProvisioningError> {
        self.provisioner.login(request).await
    }

    pub async fn logout(&self, user_id: UserId) -> Result<SecurityEvent, StoreError> {
        if self.store.find_user(user_id).await?.is_none() {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        self.recorder.record_logout(user_id).await
    }

    /// The caller must already hold `Audit.RoleChanges`.
    pub async fn assign_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
        author_user_id: UserId,
    ) -> Result<RoleAssignment, RoleAssignmentError> {
        self.roles.assign(user_id, role_id, author_user_id).await
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let users = self.store.list_users().await?;
        let roles = self.store.list_roles().await?;
        Ok(users
            .iter()
            .map(|u| UserSummary::new(u, roles.iter().find(|r| r.id == u.role_id)))
            .collect())
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleSummary>, StoreError> {
        let roles = self.store.list_roles().await?;
        Ok(roles.iter().map(RoleSummary::from).collect())
    }

    pub async fn list_auth_events(&self) -> Result<Vec<SecurityEventRecord>, StoreError> {
        self.recorder.auth_events().await
    }

    pub async fn list_role_events(&self) -> Result<Vec<SecurityEventRecord>, StoreError> {
        self.recorder.role_events().await
    }

    pub async fn list_all_events(&self) -> Result<Vec<SecurityEventRecord>, StoreError> {
        self.recorder.all_events().await
    }

    /// Re-hash the whole log and return its head.
    ///
    /// Callers that keep the returned head outside the store can pass it
    /// back as `pinned` to detect rows deleted from the end of the log.
    #[instrument(skip(self), err)]
    pub async fn verify_audit_chain(
        &self,
        pinned: Option<&ChainHead>,
    ) -> Result<ChainHead, ChainVerificationError> {
        let chain = self.store.load_chain().await?;
        let head = verify_chain(&chain, pinned).map_err(|e| {
            error!(error = %e, "audit chain verification failed");
            e
        })?;
        info!(sequence = head.sequence, "audit chain verified");
        Ok(head)
    }
}
