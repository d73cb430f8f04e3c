//! Infrastructure layer: identity storage (in-memory and Postgres), seed data
//! and the application services built on top of them.

pub mod identity_store;
pub mod seed;
pub mod services;

pub use identity_store::{
    IdentityStore, InMemoryIdentityStore, PostgresIdentityStore, RoleChange, SharedStore,
    StoreError,
};
pub use seed::Seed;
pub use services::{
    AccessError, AccessGate, AuditOperation, AuthenticatedPrincipal, ChainVerificationError,
    LoginRequest, ProvisioningError, RoleAssignment, RoleAssignmentEngine, RoleAssignmentError,
    RoleSummary, SecurityAuditService, SecurityEventRecord, SecurityEventRecorder, UserProvisioner,
    UserSummary,
};
