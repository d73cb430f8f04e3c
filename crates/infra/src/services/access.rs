//! Request-boundary composition: route, verify, resolve, load, evaluate.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use sentinel_auth::{
    AuthnError, Decision, ExternalIdentity, IssuerRouter, Permission, PrincipalResolver,
    ResolutionError, ResolvedPrincipal, TokenVerifier, UserWithRole, explain,
};

use crate::identity_store::{SharedStore, StoreError};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthnError),

    #[error("principal resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, AccessError::Authentication(e) if e.is_configuration_fault())
    }
}

/// A verified, resolved caller. `user` is `None` until first login provisions one.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    /// Name of the issuer policy that verified the credential.
    pub provider: String,
    pub principal: ResolvedPrincipal,
    pub user: Option<UserWithRole>,
}

impl AuthenticatedPrincipal {
    /// Evaluate against the snapshot loaded for this request.
    pub fn authorize(&self, required: &Permission) -> Decision {
        let (decision, denial) = explain(self.user.as_ref(), required);
        if let Some(kind) = denial {
            info!(
                permission = %required,
                denial = ?kind,
                user_id = ?self.user.as_ref().map(|u| u.user.id),
                "authorization denied"
            );
        }
        decision
    }
}

#[derive(Clone)]
pub struct AccessGate {
    router: Arc<IssuerRouter>,
    verifier: Arc<dyn TokenVerifier>,
    resolver: PrincipalResolver,
    store: SharedStore,
}

impl AccessGate {
    pub fn new(
        router: IssuerRouter,
        verifier: Arc<dyn TokenVerifier>,
        resolver: PrincipalResolver,
        store: SharedStore,
    ) -> Self {
        Self {
            router: Arc::new(router),
            verifier,
            resolver,
            store,
        }
    }

    /// Turn a bearer credential into a resolved principal plus its user, if any.
    ///
    /// Exactly one store read per call; nothing is cached across requests.
    #[instrument(skip(self, credential), err)]
    pub async fn authenticate(
        &self,
        credential: Option<&str>,
    ) -> Result<AuthenticatedPrincipal, AccessError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthnError::MissingCredential)?;

        let policy = self.router.select(token)?;
        let claims = self.verifier.verify(token, policy).map_err(|e| {
            if e.is_configuration_fault() {
                error!(policy = %policy.name, error = %e, "issuer policy misconfigured");
            }
            e
        })?;

        let principal = self.resolver.resolve(&claims).map_err(|e| {
            warn!(
                policy = %policy.name,
                available_claims = ?claims.names(),
                error = %e,
                "could not resolve principal from validated claims"
            );
            e
        })?;

        let identity = ExternalIdentity::new(&policy.name, principal.external_id.as_str());
        let user = self.store.find_user_by_identity(&identity).await?;

        Ok(AuthenticatedPrincipal {
            provider: policy.name.clone(),
            principal,
            user,
        })
    }

    /// Grant iff the caller's current role carries `(permissions, required)`.
    pub async fn resolve_and_authorize(
        &self,
        credential: Option<&str>,
        required: &Permission,
    ) -> Result<Decision, AccessError> {
        let principal = self.authenticate(credential).await?;
        Ok(principal.authorize(required))
    }
}
