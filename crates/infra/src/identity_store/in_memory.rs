use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use sentinel_auth::{
    Claim, EventCategory, ExternalIdentity, GENESIS_HASH, NewSecurityEvent, Role, SecurityEvent,
    User, UserWithRole, seal, sort_descending,
};
use sentinel_core::{ClaimId, RoleId, SecurityEventId, UserId};

use super::r#trait::{IdentityStore, RoleChange, StoreError};
use crate::seed::Seed;

#[derive(Debug, Clone)]
struct RoleRow {
    id: RoleId,
    name: String,
    description: Option<String>,
}

/// Relational-shaped state; every mutation happens under one write lock.
#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    by_identity: HashMap<ExternalIdentity, UserId>,
    by_email: HashMap<String, UserId>,
    roles: BTreeMap<RoleId, RoleRow>,
    claims: BTreeMap<ClaimId, Claim>,
    role_claims: BTreeSet<(RoleId, ClaimId)>,
    events: Vec<SecurityEvent>,
}

impl State {
    fn role(&self, id: RoleId) -> Option<Role> {
        let row = self.roles.get(&id)?;
        let claims = self
            .role_claims
            .range((id, ClaimId::from_u128(0))..)
            .take_while(|(r, _)| *r == id)
            .filter_map(|(_, c)| self.claims.get(c).cloned())
            .collect();
        Some(Role {
            id: row.id,
            name: row.name.clone(),
            description: row.description.clone(),
            claims,
        })
    }

    fn user_with_role(&self, id: UserId) -> Option<UserWithRole> {
        let user = self.users.get(&id)?.clone();
        let role = self.role(user.role_id)?;
        Some(UserWithRole { user, role })
    }

    fn append(&mut self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError> {
        for id in [event.author_user_id, event.affected_user_id] {
            if !self.users.contains_key(&id) {
                return Err(StoreError::ForeignKey(format!("event references unknown user {id}")));
            }
        }
        for id in [event.previous_role_id, event.new_role_id].into_iter().flatten() {
            if !self.roles.contains_key(&id) {
                return Err(StoreError::ForeignKey(format!("event references unknown role {id}")));
            }
        }

        let (sequence, prev_hash) = match self.events.last() {
            Some(last) => (last.sequence + 1, last.chain_hash.as_str()),
            None => (1, GENESIS_HASH),
        };
        let sealed = seal(event, SecurityEventId::new(), sequence, prev_hash);
        self.events.push(sealed.clone());
        Ok(sealed)
    }
}

/// In-memory identity store for tests and dev.
#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    state: RwLock<State>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("identity store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("identity store lock poisoned".to_string()))
    }

    /// Simulates rows deleted from the end of the log behind the service's back.
    #[cfg(test)]
    pub(crate) fn drop_newest_events(&self, n: usize) {
        if let Ok(mut state) = self.state.write() {
            let keep = state.events.len().saturating_sub(n);
            state.events.truncate(keep);
        }
    }
}

#[async_trait::async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn apply_seed(&self, seed: &Seed) -> Result<(), StoreError> {
        let mut state = self.write()?;

        for claim in seed.claims() {
            if state.claims.contains_key(&claim.id) {
                continue;
            }
            let duplicate = state
                .claims
                .values()
                .any(|c| c.claim_type == claim.claim_type && c.value == claim.value);
            if duplicate {
                return Err(StoreError::Conflict(format!(
                    "claim ({}, {}) already exists under another id",
                    claim.claim_type, claim.value
                )));
            }
            state.claims.insert(claim.id, claim.clone());
        }

        for role in &seed.roles {
            if !state.roles.contains_key(&role.id) {
                if state.roles.values().any(|r| r.name == role.name) {
                    return Err(StoreError::Conflict(format!(
                        "role name '{}' already exists under another id",
                        role.name
                    )));
                }
                state.roles.insert(
                    role.id,
                    RoleRow {
                        id: role.id,
                        name: role.name.clone(),
                        description: role.description.clone(),
                    },
                );
            }
            for claim in &role.claims {
                state.role_claims.insert((role.id, claim.id));
            }
        }

        Ok(())
    }

    async fn find_user(&self, id: UserId) -> Result<Option<UserWithRole>, StoreError> {
        Ok(self.read()?.user_with_role(id))
    }

    async fn find_user_by_identity(
        &self,
        identity: &ExternalIdentity,
    ) -> Result<Option<UserWithRole>, StoreError> {
        let state = self.read()?;
        Ok(state
            .by_identity
            .get(identity)
            .and_then(|id| state.user_with_role(*id)))
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.write()?;

        if state.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user id {} already exists", user.id)));
        }
        if state.by_identity.contains_key(&user.identity) {
            return Err(StoreError::Conflict(format!(
                "external id already registered for provider '{}'",
                user.identity.provider
            )));
        }
        if state.by_email.contains_key(&user.email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        if !state.roles.contains_key(&user.role_id) {
            return Err(StoreError::ForeignKey(format!("unknown role {}", user.role_id)));
        }

        state.by_identity.insert(user.identity.clone(), user.id);
        state.by_email.insert(user.email.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn touch_last_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.touch_login(at);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let state = self.read()?;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.read()?.role(id))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let state = self.read()?;
        Ok(state
            .roles
            .values()
            .find(|r| r.name == name)
            .and_then(|r| state.role(r.id)))
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let state = self.read()?;
        let mut roles: Vec<Role> = state.roles.keys().filter_map(|id| state.role(*id)).collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn change_role(&self, change: RoleChange) -> Result<SecurityEvent, StoreError> {
        let mut state = self.write()?;

        let current = state
            .users
            .get(&change.user_id)
            .map(|u| u.role_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", change.user_id)))?;
        if current != change.expected_role_id {
            return Err(StoreError::Conflict(format!(
                "user {} role changed concurrently",
                change.user_id
            )));
        }
        if !state.roles.contains_key(&change.new_role_id) {
            return Err(StoreError::ForeignKey(format!("unknown role {}", change.new_role_id)));
        }

        // Append first: if it fails nothing has been mutated.
        let event = state.append(change.event)?;
        if let Some(user) = state.users.get_mut(&change.user_id) {
            user.role_id = change.new_role_id;
        }
        Ok(event)
    }

    async fn append_event(&self, event: NewSecurityEvent) -> Result<SecurityEvent, StoreError> {
        self.write()?.append(event)
    }

    async fn list_events(&self, category: EventCategory) -> Result<Vec<SecurityEvent>, StoreError> {
        let state = self.read()?;
        let mut events: Vec<SecurityEvent> = state
            .events
            .iter()
            .filter(|e| category.includes(e.event_type))
            .cloned()
            .collect();
        sort_descending(&mut events);
        Ok(events)
    }

    async fn load_chain(&self) -> Result<Vec<SecurityEvent>, StoreError> {
        Ok(self.read()?.events.clone())
    }
}
