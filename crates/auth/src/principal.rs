//! Principal resolution: validated claims → stable external identity.
//!
//! Issuers disagree on claim naming, so resolution walks an ordered list of
//! claim sources and takes the first non-empty value. Supporting a new issuer
//! is a matter of adding an entry to the list.

use std::borrow::Cow;

use serde::Serialize;

use crate::claims::{ClaimSet, names};
use crate::error::ResolutionError;

/// Where a claim source comes from. Used for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOrigin {
    /// Issuer-specific short subject (e.g. Okta `uid`).
    IssuerSubject,
    /// Standard OIDC `sub`.
    OidcSubject,
    /// Issuer-specific object identifier (e.g. Microsoft `oid`).
    IssuerObjectId,
    /// Fully qualified object identifier URI.
    ObjectIdUri,
    /// Generic WS-* name identifier.
    NameIdentifier,
    Email,
    EmailUri,
    DisplayName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSource {
    pub claim: Cow<'static, str>,
    pub origin: ClaimOrigin,
}

impl ClaimSource {
    pub const fn new(claim: &'static str, origin: ClaimOrigin) -> Self {
        Self {
            claim: Cow::Borrowed(claim),
            origin,
        }
    }

    fn extract<'a>(&self, claims: &'a ClaimSet) -> Option<&'a str> {
        claims
            .iter()
            .filter(|(n, _)| *n == self.claim)
            .map(|(_, v)| v.trim())
            .find(|v| !v.is_empty())
    }
}

/// Default external-id precedence, highest first.
pub const EXTERNAL_ID_SOURCES: &[ClaimSource] = &[
    ClaimSource::new(names::OKTA_UID, ClaimOrigin::IssuerSubject),
    ClaimSource::new(names::SUBJECT, ClaimOrigin::OidcSubject),
    ClaimSource::new(names::OBJECT_ID, ClaimOrigin::IssuerObjectId),
    ClaimSource::new(names::OBJECT_ID_URI, ClaimOrigin::ObjectIdUri),
    ClaimSource::new(names::NAME_IDENTIFIER, ClaimOrigin::NameIdentifier),
];

pub const EMAIL_SOURCES: &[ClaimSource] = &[
    ClaimSource::new(names::EMAIL, ClaimOrigin::Email),
    ClaimSource::new(names::EMAIL_URI, ClaimOrigin::EmailUri),
];

pub const NAME_SOURCES: &[ClaimSource] = &[
    ClaimSource::new(names::NAME, ClaimOrigin::DisplayName),
    ClaimSource::new(names::PREFERRED_USERNAME, ClaimOrigin::DisplayName),
];

/// Identity extracted from a validated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPrincipal {
    pub external_id: String,
    pub external_id_origin: ClaimOrigin,
    /// May be absent in some flows; required wherever provisioning happens.
    pub email: Option<String>,
    pub name: Option<String>,
}

impl ResolvedPrincipal {
    pub fn require_email(&self) -> Result<&str, ResolutionError> {
        self.email.as_deref().ok_or(ResolutionError::MissingEmail)
    }
}

/// Pure claim mapper. Holds no state beyond its precedence lists.
#[derive(Debug, Clone)]
pub struct PrincipalResolver {
    external_id_sources: Vec<ClaimSource>,
    email_sources: Vec<ClaimSource>,
    name_sources: Vec<ClaimSource>,
}

impl Default for PrincipalResolver {
    fn default() -> Self {
        Self {
            external_id_sources: EXTERNAL_ID_SOURCES.to_vec(),
            email_sources: EMAIL_SOURCES.to_vec(),
            name_sources: NAME_SOURCES.to_vec(),
        }
    }
}

impl PrincipalResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an external-id source at the lowest precedence.
    pub fn with_external_id_source(mut self, source: ClaimSource) -> Self {
        self.external_id_sources.push(source);
        self
    }

    pub fn resolve(&self, claims: &ClaimSet) -> Result<ResolvedPrincipal, ResolutionError> {
        let (external_id, origin) = first_match(&self.external_id_sources, claims).ok_or_else(|| {
            ResolutionError::MissingExternalId {
                available: claims.names(),
            }
        })?;

        Ok(ResolvedPrincipal {
            external_id: external_id.to_string(),
            external_id_origin: origin,
            email: first_match(&self.email_sources, claims).map(|(v, _)| v.to_string()),
            name: first_match(&self.name_sources, claims).map(|(v, _)| v.to_string()),
        })
    }
}

fn first_match<'a>(sources: &[ClaimSource], claims: &'a ClaimSet) -> Option<(&'a str, ClaimOrigin)> {
    sources
        .iter()
        .find_map(|s| s.extract(claims).map(|v| (v, s.origin)))
}
