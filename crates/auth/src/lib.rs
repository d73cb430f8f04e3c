//! `sentinel-auth`: token verification, principal resolution, permission
//! evaluation and the audit event model.
//!
//! No HTTP and no storage here. Everything operates on values already loaded
//! by the caller.

pub mod audit;
pub mod authorize;
pub mod chain;
pub mod claims;
pub mod error;
pub mod issuer;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;
pub mod verify;

pub use audit::{EventCategory, NewSecurityEvent, SecurityEvent, SecurityEventType, sort_descending};
pub use authorize::{Decision, DenialKind, ProtectedOperation, evaluate, explain};
pub use chain::{AuditChainError, ChainHead, GENESIS_HASH, seal, verify_chain};
pub use claims::ClaimSet;
pub use error::{AuthnError, ResolutionError};
pub use issuer::{IssuerPolicy, IssuerRouter, ValidationChecks};
pub use permissions::{PERMISSIONS_CLAIM_TYPE, Permission};
pub use principal::{ClaimOrigin, ClaimSource, PrincipalResolver, ResolvedPrincipal};
pub use roles::{Claim, Role, builtin};
pub use user::{ExternalIdentity, NewUser, User, UserWithRole};
pub use verify::{JwtVerifier, TokenVerifier};
