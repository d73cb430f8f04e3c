use serde::{Deserialize, Serialize};

use sentinel_auth::ChainHead;
use sentinel_core::RoleId;
use sentinel_infra::UserSummary;

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role_id: RoleId,
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub provider: String,
    pub external_id: String,
    pub email: Option<String>,
    /// `None` until the first login.
    pub user: Option<UserSummary>,
}

/// Head recorded by an earlier verification. Both fields or neither.
#[derive(Debug, Deserialize)]
pub struct PinnedHead {
    pub sequence: Option<u64>,
    pub chain_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChainStatus {
    pub verified_events: u64,
    /// Keep this outside the store and send it back to detect deleted tail rows.
    pub head: ChainHead,
}
