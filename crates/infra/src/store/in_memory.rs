use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gatekeeper_auth::{
    CredentialRecord, CredentialStore, PasswordHash, Principal, Role, RoleDefinition, StoreError,
};
use gatekeeper_core::{Entity, PrincipalId};

#[derive(Debug, Default)]
struct State {
    principals: HashMap<PrincipalId, Principal>,
    by_username: HashMap<String, PrincipalId>,
    roles: BTreeMap<Role, RoleDefinition>,
}

impl State {
    /// Principal with its roles re-read from the catalog, so role edits are
    /// visible on the next lookup. Roles absent from the catalog keep the
    /// definition they were saved with.
    fn hydrate(&self, principal: &Principal) -> Principal {
        let mut p = principal.clone();
        p.roles = principal
            .roles
            .iter()
            .map(|r| self.roles.get(&r.name).cloned().unwrap_or_else(|| r.clone()))
            .collect();
        p
    }
}

/// In-memory credential store for tests/dev.
///
/// Every mutation runs under a single write lock, which makes the counter
/// updates atomic with respect to concurrent logins.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<State>,
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role in the catalog (keyed by name).
    pub fn upsert_role(&self, role: RoleDefinition) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        state.roles.insert(role.name.clone(), role);
        Ok(())
    }

    /// Drop a principal. Returns whether it existed.
    pub fn remove_principal(&self, id: PrincipalId) -> Result<bool, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        match state.principals.remove(&id) {
            Some(p) => {
                state.by_username.remove(&p.username);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flip the `active` flag on an existing principal.
    pub fn set_active(&self, id: PrincipalId, active: bool) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let p = state.principals.get_mut(&id).ok_or(StoreError::NotFound)?;
        p.active = active;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state
            .by_username
            .get(username)
            .and_then(|id| state.principals.get(id))
            .map(|p| state.hydrate(p)))
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state.principals.get(&id).map(|p| state.hydrate(p)))
    }

    async fn save(&self, principal: Principal) -> Result<Principal, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;

        let id = principal.id();
        if let Some(owner) = state.by_username.get(&principal.username) {
            if *owner != id {
                return Err(StoreError::Conflict(format!(
                    "username '{}' already exists",
                    principal.username
                )));
            }
        }

        if let Some(previous) = state.principals.get(&id) {
            let old_name = previous.username.clone();
            state.by_username.remove(&old_name);
        }

        state.by_username.insert(principal.username.clone(), id);
        let stored = state.hydrate(&principal);
        state.principals.insert(id, principal);
        Ok(stored)
    }

    async fn record_failed_attempt(
        &self,
        id: PrincipalId,
        lockout_threshold: u32,
    ) -> Result<CredentialRecord, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let p = state.principals.get_mut(&id).ok_or(StoreError::NotFound)?;
        p.credential.register_failure(lockout_threshold);
        Ok(p.credential.clone())
    }

    async fn record_successful_login(
        &self,
        id: PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<CredentialRecord, StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let p = state.principals.get_mut(&id).ok_or(StoreError::NotFound)?;
        if p.credential.is_locked() {
            return Err(StoreError::Locked);
        }
        p.credential.register_success(at);
        Ok(p.credential.clone())
    }

    async fn update_password_hash(&self, id: PrincipalId, hash: PasswordHash) -> Result<(), StoreError> {
        let mut state = self.inner.write().map_err(|_| poisoned())?;
        let p = state.principals.get_mut(&id).ok_or(StoreError::NotFound)?;
        p.credential.password_hash = hash;
        Ok(())
    }

    async fn find_roles_by_name(&self, names: &[Role]) -> Result<Vec<RoleDefinition>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state
            .roles
            .values()
            .filter(|r| names.contains(&r.name))
            .cloned()
            .collect())
    }

    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        let state = self.inner.read().map_err(|_| poisoned())?;
        Ok(state.roles.values().cloned().collect())
    }
}
