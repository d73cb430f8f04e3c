//! Application services over the identity store.

pub mod access;
pub mod audit_service;
pub mod operations;
pub mod provisioning;
pub mod recorder;
pub mod role_assignment;
pub mod summaries;

pub use access::{AccessError, AccessGate, AuthenticatedPrincipal};
pub use audit_service::{ChainVerificationError, SecurityAuditService};
pub use operations::AuditOperation;
pub use provisioning::{LoginRequest, ProvisioningError, UserProvisioner};
pub use recorder::SecurityEventRecorder;
pub use role_assignment::{RoleAssignment, RoleAssignmentEngine, RoleAssignmentError};
pub use summaries::{RoleSummary, SecurityEventRecord, UserSummary};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use sentinel_core::{Clock, ManualClock};

    use crate::identity_store::{IdentityStore, InMemoryIdentityStore, SharedStore};
    use crate::seed::Seed;

    pub async fn seeded_store() -> SharedStore {
        let store = InMemoryIdentityStore::new();
        store.apply_seed(&Seed::builtin()).await.unwrap();
        Arc::new(store)
    }

    pub fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()))
    }

    pub fn as_clock(clock: &Arc<ManualClock>) -> Arc<dyn Clock> {
        clock.clone()
    }
}
