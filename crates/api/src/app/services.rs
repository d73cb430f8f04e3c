use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use sentinel_auth::{AuthnError, IssuerRouter, JwtVerifier};
use sentinel_core::SystemClock;
use sentinel_infra::{
    InMemoryIdentityStore, PostgresIdentityStore, SecurityAuditService, SharedStore, StoreError,
};

use crate::config::{ApiConfig, KeyMaterial};

#[derive(Debug, Error)]
pub enum WiringError {
    #[error(transparent)]
    Issuer(#[from] AuthnError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Router and verifier for the configured issuers.
pub fn build_issuers(config: &ApiConfig) -> Result<(IssuerRouter, JwtVerifier), AuthnError> {
    let mut verifier = JwtVerifier::new();
    for issuer in &config.issuers {
        verifier = match &issuer.key {
            KeyMaterial::Secret(secret) => verifier.with_secret(&issuer.policy.name, secret.as_bytes()),
            KeyMaterial::RsaPem(pem) => verifier.with_rsa_pem(&issuer.policy.name, pem.as_bytes())?,
        };
    }

    let policies = config.issuers.iter().map(|i| i.policy.clone()).collect();
    let router = IssuerRouter::new(policies, &config.default_policy)?;
    Ok((router, verifier))
}

/// Wire the facade. Uses Postgres when `DATABASE_URL` is set.
pub async fn build_service(config: &ApiConfig) -> Result<SecurityAuditService, WiringError> {
    let (router, verifier) = build_issuers(config)?;

    let store: SharedStore = match &config.database_url {
        Some(url) => {
            info!("using postgres identity store");
            Arc::new(PostgresIdentityStore::connect(url).await?)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory identity store");
            Arc::new(InMemoryIdentityStore::new())
        }
    };

    Ok(SecurityAuditService::new(
        store,
        router,
        Arc::new(verifier),
        Arc::new(SystemClock),
    ))
}
