//! Process configuration from environment variables.

use thiserror::Error;

use sentinel_auth::IssuerPolicy;
use sentinel_auth::issuer::{MICROSOFT, OKTA};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("no issuer configured (set OKTA_DOMAIN and/or MICROSOFT_TENANT_ID)")]
    NoIssuers,

    #[error("{0}")]
    Invalid(String),
}

/// Signing key material for one issuer policy.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// HS256 shared secret.
    Secret(String),
    /// RS256 public key, PEM text.
    RsaPem(String),
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMaterial::Secret(_) => f.write_str("Secret(..)"),
            KeyMaterial::RsaPem(_) => f.write_str("RsaPem(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub policy: IssuerPolicy,
    pub key: KeyMaterial,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: String,
    /// Postgres URL. In-memory store when absent.
    pub database_url: Option<String>,
    pub issuers: Vec<IssuerConfig>,
    pub default_policy: String,
}

struct IssuerVars {
    name: &'static str,
    locator: &'static str,
    audience: &'static str,
    pem: &'static str,
    secret: &'static str,
    build: fn(&str, String) -> IssuerPolicy,
}

const OKTA_VARS: IssuerVars = IssuerVars {
    name: OKTA,
    locator: "OKTA_DOMAIN",
    audience: "OKTA_AUDIENCE",
    pem: "OKTA_KEY_PEM",
    secret: "OKTA_SECRET",
    build: |domain, audience| IssuerPolicy::okta(domain, audience),
};

const MICROSOFT_VARS: IssuerVars = IssuerVars {
    name: MICROSOFT,
    locator: "MICROSOFT_TENANT_ID",
    audience: "MICROSOFT_AUDIENCE",
    pem: "MICROSOFT_KEY_PEM",
    secret: "MICROSOFT_SECRET",
    build: |tenant, audience| IssuerPolicy::microsoft(tenant, audience),
};

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut issuers = Vec::new();
        for vars in [&OKTA_VARS, &MICROSOFT_VARS] {
            let Some(locator) = get(vars.locator) else {
                continue;
            };
            let audience = get(vars.audience).ok_or(ConfigError::Missing(vars.audience))?;
            let key = match (get(vars.pem), get(vars.secret)) {
                (Some(pem), _) => KeyMaterial::RsaPem(pem),
                (None, Some(secret)) => KeyMaterial::Secret(secret),
                (None, None) => return Err(ConfigError::Missing(vars.pem)),
            };
            let policy = (vars.build)(&locator, audience);
            debug_assert_eq!(policy.name, vars.name);
            issuers.push(IssuerConfig { policy, key });
        }

        let first = issuers.first().ok_or(ConfigError::NoIssuers)?;
        let default_policy = match get("SENTINEL_DEFAULT_POLICY") {
            Some(name) => {
                let name = name.to_ascii_lowercase();
                if !issuers.iter().any(|i| i.policy.name == name) {
                    return Err(ConfigError::Invalid(format!(
                        "SENTINEL_DEFAULT_POLICY '{name}' is not a configured issuer"
                    )));
                }
                name
            }
            None => first.policy.name.clone(),
        };

        Ok(Self {
            bind_addr: get("SENTINEL_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: get("DATABASE_URL"),
            issuers,
            default_policy,
        })
    }
}
