//! Boundary errors for credential handling.
//!
//! Both kinds are resolved at the request boundary; neither ever reaches the
//! permission evaluator.

use thiserror::Error;

/// The credential could not be turned into a validated principal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthnError {
    #[error("no bearer credential presented")]
    MissingCredential,

    #[error("malformed credential: {0}")]
    Malformed(String),

    /// Verification failed under the selected policy. No other policy is tried.
    #[error("credential rejected by policy '{policy}': {reason}")]
    Rejected { policy: String, reason: String },

    #[error("issuer policy misconfigured: {0}")]
    Misconfigured(String),
}

impl AuthnError {
    pub fn rejected(policy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            policy: policy.into(),
            reason: reason.into(),
        }
    }

    /// Configuration faults are operator problems, not caller problems.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(self, AuthnError::Misconfigured(_))
    }
}

/// A validated principal lacks a usable identity claim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no external identity claim present (available claims: {available:?})")]
    MissingExternalId { available: Vec<String> },

    #[error("no email claim present")]
    MissingEmail,
}
