//! Built-in roles and permission claims.
//!
//! Identifiers are fixed so every deployment agrees on role ids.

use sentinel_auth::{Claim, Permission, Role, builtin};
use sentinel_core::{ClaimId, RoleId};

pub const BASIC_USER_ID: RoleId = RoleId::from_u128(0x11111111_1111_1111_1111_111111111111);
pub const AUTH_OBSERVER_ID: RoleId = RoleId::from_u128(0x22222222_2222_2222_2222_222222222222);
pub const SECURITY_AUDITOR_ID: RoleId = RoleId::from_u128(0x33333333_3333_3333_3333_333333333333);

pub const VIEW_AUTH_EVENTS_CLAIM_ID: ClaimId =
    ClaimId::from_u128(0x44444444_4444_4444_4444_444444444444);
pub const ROLE_CHANGES_CLAIM_ID: ClaimId =
    ClaimId::from_u128(0x55555555_5555_5555_5555_555555555555);

/// Roles (with their claims) installed at store creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub roles: Vec<Role>,
}

impl Seed {
    /// `BasicUser` (no claims), `AuthObserver` (view auth events) and
    /// `SecurityAuditor` (view auth events + role changes).
    pub fn builtin() -> Self {
        let view_auth = Claim::permission(VIEW_AUTH_EVENTS_CLAIM_ID, &Permission::VIEW_AUTH_EVENTS);
        let role_changes = Claim::permission(ROLE_CHANGES_CLAIM_ID, &Permission::ROLE_CHANGES);

        Self {
            roles: vec![
                Role::new(BASIC_USER_ID, builtin::BASIC_USER)
                    .with_description("Default role for all new users with no special permissions"),
                Role::new(AUTH_OBSERVER_ID, builtin::AUTH_OBSERVER)
                    .with_description("Can view authentication events")
                    .with_claim(view_auth.clone()),
                Role::new(SECURITY_AUDITOR_ID, builtin::SECURITY_AUDITOR)
                    .with_description("Can view all events and manage roles")
                    .with_claim(view_auth)
                    .with_claim(role_changes),
            ],
        }
    }

    /// Distinct claims across all roles, first occurrence wins.
    pub fn claims(&self) -> Vec<&Claim> {
        let mut out: Vec<&Claim> = Vec::new();
        for claim in self.roles.iter().flat_map(|r| r.claims.iter()) {
            if !out.iter().any(|c| c.id == claim.id) {
                out.push(claim);
            }
        }
        out
    }
}

impl Default for Seed {
    fn default() -> Self {
        Self::builtin()
    }
}
