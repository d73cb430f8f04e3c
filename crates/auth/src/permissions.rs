use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Claim type under which permission atoms are stored.
pub const PERMISSIONS_CLAIM_TYPE: &str = "permissions";

/// Permission identifier.
///
/// Permissions are opaque strings (e.g. "Audit.ViewAuthEvents") compared by
/// exact value. There is no wildcard and no hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// View login/logout events.
    pub const VIEW_AUTH_EVENTS: Permission = Permission::from_static("Audit.ViewAuthEvents");

    /// View role-change events and assign roles.
    pub const ROLE_CHANGES: Permission = Permission::from_static("Audit.RoleChanges");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
