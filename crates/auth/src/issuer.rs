//! Multi-issuer credential routing.
//!
//! The router reads the *unverified* issuer claim only to decide which policy
//! verifies the token. Nothing read here is trusted; the selected policy does
//! the real verification and a rejection there is final.

use std::collections::HashSet;

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::claims::names;
use crate::error::AuthnError;

pub const OKTA: &str = "okta";
pub const MICROSOFT: &str = "microsoft";

/// Verification toggles. Every one of them must be on for a usable policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationChecks {
    pub signature: bool,
    pub issuer: bool,
    pub audience: bool,
    pub lifetime: bool,
}

impl ValidationChecks {
    pub const fn strict() -> Self {
        Self {
            signature: true,
            issuer: true,
            audience: true,
            lifetime: true,
        }
    }

    fn disabled(&self) -> Vec<&'static str> {
        let mut off = Vec::new();
        if !self.signature {
            off.push("signature");
        }
        if !self.issuer {
            off.push("issuer");
        }
        if !self.audience {
            off.push("audience");
        }
        if !self.lifetime {
            off.push("lifetime");
        }
        off
    }
}

impl Default for ValidationChecks {
    fn default() -> Self {
        Self::strict()
    }
}

/// A named, provider-specific set of token-validation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerPolicy {
    pub name: String,
    /// Case-insensitive substrings matched against the unverified `iss`.
    pub issuer_patterns: Vec<String>,
    /// Base URL for signing-key discovery.
    pub authority: String,
    /// Exact `iss` values accepted during verification.
    pub valid_issuers: Vec<String>,
    pub audience: String,
    pub checks: ValidationChecks,
    /// Allowed clock skew for `exp`/`nbf`, in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

fn default_leeway() -> u64 {
    60
}

impl IssuerPolicy {
    /// Okta authorization server `https://{domain}/oauth2/default`.
    pub fn okta(domain: &str, audience: impl Into<String>) -> Self {
        let authority = format!("https://{}/oauth2/default", domain.trim_end_matches('/'));
        Self {
            name: OKTA.to_string(),
            issuer_patterns: vec!["okta.com".to_string()],
            valid_issuers: vec![authority.clone()],
            authority,
            audience: audience.into(),
            checks: ValidationChecks::strict(),
            leeway_secs: default_leeway(),
        }
    }

    /// Microsoft identity platform for one tenant. Accepts both v1 (`sts.windows.net`)
    /// and v2 (`login.microsoftonline.com`) issuers.
    pub fn microsoft(tenant_id: &str, audience: impl Into<String>) -> Self {
        let authority = format!("https://login.microsoftonline.com/{tenant_id}/v2.0");
        Self {
            name: MICROSOFT.to_string(),
            issuer_patterns: vec![
                "sts.windows.net".to_string(),
                "microsoftonline.com".to_string(),
            ],
            valid_issuers: vec![
                authority.clone(),
                format!("https://sts.windows.net/{tenant_id}/"),
            ],
            authority,
            audience: audience.into(),
            checks: ValidationChecks::strict(),
            leeway_secs: default_leeway(),
        }
    }

    /// A policy that disables any check is a misconfiguration, never a mode.
    pub fn validate(&self) -> Result<(), AuthnError> {
        if self.name.trim().is_empty() {
            return Err(AuthnError::Misconfigured("policy name is empty".to_string()));
        }
        let off = self.checks.disabled();
        if !off.is_empty() {
            return Err(AuthnError::Misconfigured(format!(
                "policy '{}' disables required checks: {}",
                self.name,
                off.join(", ")
            )));
        }
        if self.audience.trim().is_empty() {
            return Err(AuthnError::Misconfigured(format!(
                "policy '{}' has no audience",
                self.name
            )));
        }
        if self.valid_issuers.is_empty() {
            return Err(AuthnError::Misconfigured(format!(
                "policy '{}' has no valid issuers",
                self.name
            )));
        }
        Ok(())
    }

    pub fn matches_issuer(&self, issuer: &str) -> bool {
        let issuer = issuer.to_ascii_lowercase();
        self.issuer_patterns
            .iter()
            .any(|p| !p.is_empty() && issuer.contains(&p.to_ascii_lowercase()))
    }
}

/// Selects the verification policy for a credential. First match wins.
#[derive(Debug, Clone)]
pub struct IssuerRouter {
    policies: Vec<IssuerPolicy>,
    default_index: usize,
}

impl IssuerRouter {
    pub fn new(policies: Vec<IssuerPolicy>, default_policy: &str) -> Result<Self, AuthnError> {
        let mut seen = HashSet::new();
        for p in &policies {
            p.validate()?;
            if !seen.insert(p.name.as_str()) {
                return Err(AuthnError::Misconfigured(format!(
                    "duplicate policy name '{}'",
                    p.name
                )));
            }
        }

        let default_index = policies
            .iter()
            .position(|p| p.name == default_policy)
            .ok_or_else(|| {
                AuthnError::Misconfigured(format!("default policy '{default_policy}' is not configured"))
            })?;

        Ok(Self {
            policies,
            default_index,
        })
    }

    pub fn default_policy(&self) -> &IssuerPolicy {
        &self.policies[self.default_index]
    }

    /// Route by issuer string (no token parsing).
    pub fn route_issuer(&self, issuer: Option<&str>) -> &IssuerPolicy {
        issuer
            .and_then(|iss| self.policies.iter().find(|p| p.matches_issuer(iss)))
            .unwrap_or_else(|| self.default_policy())
    }

    /// Route a raw bearer credential.
    ///
    /// A structurally broken token is an authentication failure. A token without
    /// an issuer claim goes to the default policy, whose issuer check rejects it.
    pub fn select(&self, token: &str) -> Result<&IssuerPolicy, AuthnError> {
        let issuer = peek_issuer(token)?;
        let policy = self.route_issuer(issuer.as_deref());
        tracing::debug!(policy = %policy.name, issuer = ?issuer, "issuer routed");
        Ok(policy)
    }
}

/// Decode a token's payload without verifying anything and return its `iss`.
pub fn peek_issuer(token: &str) -> Result<Option<String>, AuthnError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<JsonValue>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthnError::Malformed(e.to_string()))?;

    Ok(data
        .claims
        .get(names::ISSUER)
        .and_then(JsonValue::as_str)
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn token_with_issuer(iss: Option<&str>) -> String {
        let claims = match iss {
            Some(iss) => json!({ "iss": iss, "sub": "s" }),
            None => json!({ "sub": "s" }),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"irrelevant")).unwrap()
    }

    fn router() -> IssuerRouter {
        let fallback = IssuerPolicy {
            name: "internal".to_string(),
            issuer_patterns: vec![],
            authority: "https://id.internal".to_string(),
            valid_issuers: vec!["https://id.internal".to_string()],
            audience: "api://internal".to_string(),
            checks: ValidationChecks::strict(),
            leeway_secs: 0,
        };
        IssuerRouter::new(
            vec![
                IssuerPolicy::okta("dev-1.okta.com", "api://default"),
                IssuerPolicy::microsoft("tenant-1", "api://sentinel"),
                fallback,
            ],
            "internal",
        )
        .unwrap()
    }

    #[test]
    fn okta_issuer_selects_okta() {
        let token = token_with_issuer(Some("https://dev-1.okta.com/oauth2/default"));
        assert_eq!(router().select(&token).unwrap().name, OKTA);
    }

    #[test]
    fn microsoft_issuers_select_microsoft() {
        let v1 = token_with_issuer(Some("https://sts.windows.net/tenant-1/"));
        let v2 = token_with_issuer(Some("https://login.microsoftonline.com/tenant-1/v2.0"));
        let r = router();
        assert_eq!(r.select(&v1).unwrap().name, MICROSOFT);
        assert_eq!(r.select(&v2).unwrap().name, MICROSOFT);
    }

    #[test]
    fn unknown_or_missing_issuer_falls_back_to_default() {
        let r = router();
        let other = token_with_issuer(Some("https://accounts.example.org"));
        let missing = token_with_issuer(None);
        assert_eq!(r.select(&other).unwrap().name, "internal");
        assert_eq!(r.select(&missing).unwrap().name, "internal");
    }

    #[test]
    fn pattern_match_is_case_insensitive() {
        assert_eq!(router().route_issuer(Some("HTTPS://DEV-1.OKTA.COM")).name, OKTA);
    }

    #[test]
    fn malformed_token_is_rejected() {
        let err = router().select("definitely.not-a.jwt").unwrap_err();
        assert!(matches!(err, AuthnError::Malformed(_)));

        let err = router().select("").unwrap_err();
        assert!(matches!(err, AuthnError::Malformed(_)));
    }

    #[test]
    fn disabled_check_is_a_configuration_fault() {
        let mut policy = IssuerPolicy::okta("dev-1.okta.com", "api://default");
        policy.checks.lifetime = false;

        let err = IssuerRouter::new(vec![policy], OKTA).unwrap_err();
        assert!(err.is_configuration_fault());
        assert!(err.to_string().contains("lifetime"));
    }

    #[test]
    fn default_must_exist() {
        let err = IssuerRouter::new(
            vec![IssuerPolicy::okta("dev-1.okta.com", "api://default")],
            MICROSOFT,
        )
        .unwrap_err();
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = IssuerRouter::new(
            vec![
                IssuerPolicy::okta("a.okta.com", "api://default"),
                IssuerPolicy::okta("b.okta.com", "api://default"),
            ],
            OKTA,
        )
        .unwrap_err();
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn authorities_follow_provider_conventions() {
        assert_eq!(
            IssuerPolicy::okta("dev-1.okta.com", "aud").authority,
            "https://dev-1.okta.com/oauth2/default"
        );
        assert_eq!(
            IssuerPolicy::microsoft("t1", "aud").authority,
            "https://login.microsoftonline.com/t1/v2.0"
        );
    }
}
