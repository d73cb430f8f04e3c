use serde::{Deserialize, Serialize};

use sentinel_core::{ClaimId, Entity, RoleId};

use crate::permissions::{PERMISSIONS_CLAIM_TYPE, Permission};

/// Names of the roles every store is seeded with.
pub mod builtin {
    /// Default for new registrations. Holds no claims.
    pub const BASIC_USER: &str = "BasicUser";
    pub const AUTH_OBSERVER: &str = "AuthObserver";
    pub const SECURITY_AUDITOR: &str = "SecurityAuditor";
}

/// A `(type, value)` permission atom. The pair is unique per store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(id: ClaimId, claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }

    /// A claim of type `permissions` carrying the given permission.
    pub fn permission(id: ClaimId, permission: &Permission) -> Self {
        Self::new(id, PERMISSIONS_CLAIM_TYPE, permission.as_str())
    }

    pub fn grants(&self, permission: &Permission) -> bool {
        self.claim_type == PERMISSIONS_CLAIM_TYPE && self.value == permission.as_str()
    }
}

impl Entity for Claim {
    type Id = ClaimId;

    fn id(&self) -> ClaimId {
        self.id
    }
}

/// A named bundle of claims, with its claim set loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub claims: Vec<Claim>,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            claims: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Strict positive match over the role's own claims.
    pub fn grants(&self, permission: &Permission) -> bool {
        self.claims.iter().any(|c| c.grants(permission))
    }

    /// Values of all `permissions` claims, sorted.
    pub fn permission_values(&self) -> Vec<String> {
        let mut values: Vec<String> = self
            .claims
            .iter()
            .filter(|c| c.claim_type == PERMISSIONS_CLAIM_TYPE)
            .map(|c| c.value.clone())
            .collect();
        values.sort();
        values
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> RoleId {
        self.id
    }
}
