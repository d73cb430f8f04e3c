//! Credential verification under a selected issuer policy.

use std::collections::HashMap;
use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value as JsonValue;

use crate::claims::ClaimSet;
use crate::error::AuthnError;
use crate::issuer::IssuerPolicy;

/// Produces a validated claim set from a bearer credential.
///
/// Implementations must apply every check of the given policy and must never
/// retry under a different policy.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, policy: &IssuerPolicy) -> Result<ClaimSet, AuthnError>;
}

impl<V> TokenVerifier for std::sync::Arc<V>
where
    V: TokenVerifier + ?Sized,
{
    fn verify(&self, token: &str, policy: &IssuerPolicy) -> Result<ClaimSet, AuthnError> {
        (**self).verify(token, policy)
    }
}

struct PolicyKey {
    algorithm: Algorithm,
    key: DecodingKey,
}

/// JWT verifier with key material per policy name.
///
/// Key discovery (JWKS at the policy authority) is the caller's concern; this
/// type only holds what discovery produced.
#[derive(Default)]
pub struct JwtVerifier {
    keys: HashMap<String, PolicyKey>,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.keys.keys().collect();
        names.sort();
        f.debug_struct("JwtVerifier").field("policies", &names).finish()
    }
}

impl JwtVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// HMAC-SHA256 shared secret (development and internal issuers).
    pub fn with_secret(mut self, policy: impl Into<String>, secret: &[u8]) -> Self {
        self.keys.insert(
            policy.into(),
            PolicyKey {
                algorithm: Algorithm::HS256,
                key: DecodingKey::from_secret(secret),
            },
        );
        self
    }

    /// RSA public key (RS256), PEM encoded.
    pub fn with_rsa_pem(mut self, policy: impl Into<String>, pem: &[u8]) -> Result<Self, AuthnError> {
        let policy = policy.into();
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| AuthnError::Misconfigured(format!("policy '{policy}': bad RSA key: {e}")))?;
        self.keys.insert(
            policy,
            PolicyKey {
                algorithm: Algorithm::RS256,
                key,
            },
        );
        Ok(self)
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str, policy: &IssuerPolicy) -> Result<ClaimSet, AuthnError> {
        policy.validate()?;

        let key = self.keys.get(&policy.name).ok_or_else(|| {
            AuthnError::Misconfigured(format!("no signing key for policy '{}'", policy.name))
        })?;

        let mut validation = Validation::new(key.algorithm);
        validation.leeway = policy.leeway_secs;
        validation.validate_exp = true;
        validation.validate_aud = true;
        validation.set_audience(&[policy.audience.as_str()]);
        validation.set_issuer(policy.valid_issuers.as_slice());
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let data = decode::<JsonValue>(token, &key.key, &validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired".to_string(),
                ErrorKind::ImmatureSignature => "token not yet valid".to_string(),
                ErrorKind::InvalidSignature => "bad signature".to_string(),
                ErrorKind::InvalidAudience => "wrong audience".to_string(),
                ErrorKind::InvalidIssuer => "wrong issuer".to_string(),
                ErrorKind::InvalidAlgorithm => "unexpected algorithm".to_string(),
                ErrorKind::MissingRequiredClaim(c) => format!("missing claim '{c}'"),
                other => format!("{other:?}"),
            };
            tracing::warn!(policy = %policy.name, %reason, "credential rejected");
            AuthnError::rejected(policy.name.clone(), reason)
        })?;

        Ok(ClaimSet::from_json(&data.claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::{MICROSOFT, OKTA};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const OKTA_SECRET: &[u8] = b"okta-test-secret";
    const MS_SECRET: &[u8] = b"microsoft-test-secret";
    const OKTA_ISS: &str = "https://dev-1.okta.com/oauth2/default";

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn mint(secret: &[u8], claims: serde_json::Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier::new()
            .with_secret(OKTA, OKTA_SECRET)
            .with_secret(MICROSOFT, MS_SECRET)
    }

    fn okta() -> IssuerPolicy {
        IssuerPolicy::okta("dev-1.okta.com", "api://default")
    }

    #[test]
    fn valid_token_yields_claims() {
        let token = mint(
            OKTA_SECRET,
            json!({ "iss": OKTA_ISS, "aud": "api://default", "exp": now() + 600, "uid": "00u1", "email": "a@example.com" }),
        );

        let claims = verifier().verify(&token, &okta()).unwrap();
        assert_eq!(claims.first("uid"), Some("00u1"));
        assert_eq!(claims.first("email"), Some("a@example.com"));
    }

    #[test]
    fn expired_token_rejected() {
        let token = mint(
            OKTA_SECRET,
            json!({ "iss": OKTA_ISS, "aud": "api://default", "exp": now() - 3600, "sub": "s" }),
        );

        let err = verifier().verify(&token, &okta()).unwrap_err();
        assert_eq!(err, AuthnError::rejected(OKTA, "token expired"));
    }

    #[test]
    fn wrong_audience_rejected() {
        let token = mint(
            OKTA_SECRET,
            json!({ "iss": OKTA_ISS, "aud": "api://other", "exp": now() + 600, "sub": "s" }),
        );

        let err = verifier().verify(&token, &okta()).unwrap_err();
        assert_eq!(err, AuthnError::rejected(OKTA, "wrong audience"));
    }

    #[test]
    fn signature_from_other_issuer_rejected() {
        // Routed to Okta but signed with the Microsoft key: no fallback.
        let token = mint(
            MS_SECRET,
            json!({ "iss": OKTA_ISS, "aud": "api://default", "exp": now() + 600, "sub": "s" }),
        );

        let err = verifier().verify(&token, &okta()).unwrap_err();
        assert_eq!(err, AuthnError::rejected(OKTA, "bad signature"));
    }

    #[test]
    fn wrong_issuer_rejected() {
        let token = mint(
            OKTA_SECRET,
            json!({ "iss": "https://evil.okta.com.example", "aud": "api://default", "exp": now() + 600, "sub": "s" }),
        );

        let err = verifier().verify(&token, &okta()).unwrap_err();
        assert_eq!(err, AuthnError::rejected(OKTA, "wrong issuer"));
    }

    #[test]
    fn missing_key_is_misconfiguration() {
        let token = mint(OKTA_SECRET, json!({ "iss": OKTA_ISS }));
        let err = JwtVerifier::new().verify(&token, &okta()).unwrap_err();
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn relaxed_policy_refused_at_verification() {
        let mut policy = okta();
        policy.checks.signature = false;
        let token = mint(
            OKTA_SECRET,
            json!({ "iss": OKTA_ISS, "aud": "api://default", "exp": now() + 600, "sub": "s" }),
        );

        let err = verifier().verify(&token, &policy).unwrap_err();
        assert!(err.is_configuration_fault());
    }
}
