use sentinel_auth::UserWithRole;
use sentinel_infra::AuthenticatedPrincipal;

/// Authenticated caller for a request, inserted by the auth middleware.
///
/// Holds the single identity-store snapshot taken for this request.
#[derive(Debug, Clone)]
pub struct CallerContext {
    principal: AuthenticatedPrincipal,
}

impl CallerContext {
    pub fn new(principal: AuthenticatedPrincipal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &AuthenticatedPrincipal {
        &self.principal
    }

    /// `None` until the caller has logged in once.
    pub fn user(&self) -> Option<&UserWithRole> {
        self.principal.user.as_ref()
    }
}
