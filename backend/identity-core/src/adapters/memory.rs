/// In-process collaborators
///
/// Same contracts as the Redis/PostgreSQL adapters: real TTL expiry, atomic
/// compare-and-delete, unique names and idempotent association inserts.
/// Failure and latency can be injected to exercise dependency-error paths.
use crate::models::{NewPermission, Permission, Role, User};
use crate::ports::{
    ChallengeStore, ConsumeOutcome, GatewayError, NotificationGateway, RbacRepository,
    StoreError, UserRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

// ============================================================================
// Fault injection
// ============================================================================

#[derive(Default)]
struct Faults {
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl Faults {
    async fn check(&self) -> Result<(), StoreError> {
        let latency = *self.latency.lock();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Challenge store
// ============================================================================

struct Challenge {
    value: String,
    expires_at: Instant,
}

impl Challenge {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Default)]
pub struct InMemoryChallengeStore {
    entries: DashMap<String, Challenge>,
    faults: Faults,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.lock() = latency;
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.faults.check().await?;
        self.entries.insert(
            key.to_string(),
            Challenge {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.faults.check().await?;
        let challenge = Challenge {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) if entry.get().is_expired() => {
                entry.insert(challenge);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(challenge);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.faults.check().await?;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_expired() => {
                entry.remove();
                Ok(None)
            }
            Entry::Occupied(entry) => Ok(Some(entry.get().value.clone())),
            Entry::Vacant(_) => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.faults.check().await?;
        self.entries.remove(key);
        Ok(())
    }

    async fn consume_if_matches(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<ConsumeOutcome, StoreError> {
        self.faults.check().await?;
        // The entry guard holds the shard lock for the whole compare-and-delete
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().is_expired() => {
                entry.remove();
                Ok(ConsumeOutcome::Absent)
            }
            Entry::Occupied(entry) if entry.get().value == expected => {
                entry.remove();
                Ok(ConsumeOutcome::Consumed)
            }
            Entry::Occupied(_) => Ok(ConsumeOutcome::Mismatch),
            Entry::Vacant(_) => Ok(ConsumeOutcome::Absent),
        }
    }
}

// ============================================================================
// Identity store
// ============================================================================

#[derive(Default)]
struct IdentityState {
    users: HashMap<Uuid, User>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    role_permissions: HashSet<(Uuid, Uuid)>,
    user_roles: HashSet<(Uuid, Uuid)>,
}

impl IdentityState {
    fn role_with_permissions(&self, role: &Role) -> Role {
        let mut role = role.clone();
        role.permissions = self.permissions_of(role.id);
        role
    }

    fn permissions_of(&self, role_id: Uuid) -> Vec<Permission> {
        let mut permissions: Vec<Permission> = self
            .role_permissions
            .iter()
            .filter(|(r, _)| *r == role_id)
            .filter_map(|(_, p)| self.permissions.get(p).cloned())
            .collect();
        permissions.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        permissions
    }

    fn role_ids_of(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.user_roles
            .iter()
            .filter(move |(u, _)| *u == user_id)
            .map(|(_, r)| *r)
    }

    fn role_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.roles
            .values()
            .any(|r| r.name == name && Some(r.id) != except)
    }
}

/// Users plus roles/permissions with the relational uniqueness rules
#[derive(Default)]
pub struct InMemoryIdentityStore {
    state: RwLock<IdentityState>,
    faults: Faults,
    failing_names: RwLock<HashSet<String>>,
    lookups: AtomicUsize,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.faults.latency.lock() = latency;
    }

    /// Make role/permission membership checks for `name` fail with `Unavailable`
    pub fn fail_lookups_for(&self, name: &str) {
        self.failing_names.write().insert(name.to_string());
    }

    /// Number of membership checks served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Insert a fully-formed user (e.g. one with an email)
    pub fn insert_user(&self, user: User) {
        self.state.write().users.insert(user.id, user);
    }

    async fn membership_check(&self, name: &str) -> Result<(), StoreError> {
        self.faults.check().await?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_names.read().contains(name) {
            return Err(StoreError::Unavailable(format!(
                "injected lookup failure for {}",
                name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryIdentityStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.faults.check().await?;
        Ok(self.state.read().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.faults.check().await?;
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        self.faults.check().await?;
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn create_with_phone(&self, phone: &str) -> Result<User, StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        if state
            .users
            .values()
            .any(|u| u.phone.as_deref() == Some(phone))
        {
            return Err(StoreError::Conflict(format!("phone {} already registered", phone)));
        }

        let user = User::with_phone(phone);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_two_factor_secret(&self, user_id: Uuid, secret: &str) -> Result<(), StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

        user.two_factor_secret = Some(secret.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn enable_two_factor(
        &self,
        user_id: Uuid,
        backup_code_hashes: &[String],
    ) -> Result<(), StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;

        user.two_factor_backup_codes = backup_code_hashes.to_vec();
        user.two_factor_enabled = true;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> Result<bool, StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };

        match user
            .two_factor_backup_codes
            .iter()
            .position(|h| h == code_hash)
        {
            Some(index) => {
                user.two_factor_backup_codes.remove(index);
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RbacRepository for InMemoryIdentityStore {
    async fn create_role(&self, name: &str, description: &str) -> Result<Role, StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        if state.role_name_taken(name, None) {
            return Err(StoreError::Conflict(format!("role {} already exists", name)));
        }

        let role = Role::new(name, description);
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, StoreError> {
        self.faults.check().await?;
        let state = self.state.read();
        Ok(state
            .roles
            .get(&role_id)
            .map(|r| state.role_with_permissions(r)))
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        self.faults.check().await?;
        let state = self.state.read();
        Ok(state
            .roles
            .values()
            .find(|r| r.name == name)
            .map(|r| state.role_with_permissions(r)))
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.faults.check().await?;
        let state = self.state.read();
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .map(|r| state.role_with_permissions(r))
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn update_role(
        &self,
        role_id: Uuid,
        name: &str,
        description: &str,
    ) -> Result<Role, StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        if state.role_name_taken(name, Some(role_id)) {
            return Err(StoreError::Conflict(format!("role {} already exists", name)));
        }

        let role = state
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| StoreError::NotFound(format!("role {}", role_id)))?;
        role.name = name.to_string();
        role.description = description.to_string();
        role.updated_at = Utc::now();

        let role = role.clone();
        Ok(state.role_with_permissions(&role))
    }

    async fn delete_role(&self, role_id: Uuid) -> Result<(), StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        if state.roles.remove(&role_id).is_none() {
            return Err(StoreError::NotFound(format!("role {}", role_id)));
        }
        state.role_permissions.retain(|(r, _)| *r != role_id);
        state.user_roles.retain(|(_, r)| *r != role_id);
        Ok(())
    }

    async fn create_permission(
        &self,
        permission: &NewPermission,
    ) -> Result<Permission, StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        if state.permissions.values().any(|p| p.name == permission.name) {
            return Err(StoreError::Conflict(format!(
                "permission {} already exists",
                permission.name
            )));
        }

        let created = permission.clone().into_permission();
        state.permissions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_permission_by_id(
        &self,
        permission_id: Uuid,
    ) -> Result<Option<Permission>, StoreError> {
        self.faults.check().await?;
        Ok(self.state.read().permissions.get(&permission_id).cloned())
    }

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError> {
        self.faults.check().await?;
        Ok(self
            .state
            .read()
            .permissions
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        self.faults.check().await?;
        let mut permissions: Vec<Permission> =
            self.state.read().permissions.values().cloned().collect();
        permissions.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        Ok(permissions)
    }

    async fn delete_permission(&self, permission_id: Uuid) -> Result<(), StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        if state.permissions.remove(&permission_id).is_none() {
            return Err(StoreError::NotFound(format!("permission {}", permission_id)));
        }
        state.role_permissions.retain(|(_, p)| *p != permission_id);
        Ok(())
    }

    async fn assign_permission_to_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {}", role_id)));
        }
        if !state.permissions.contains_key(&permission_id) {
            return Err(StoreError::NotFound(format!("permission {}", permission_id)));
        }
        state.role_permissions.insert((role_id, permission_id));
        Ok(())
    }

    async fn remove_permission_from_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        self.faults.check().await?;
        self.state
            .write()
            .role_permissions
            .remove(&(role_id, permission_id));
        Ok(())
    }

    async fn get_role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>, StoreError> {
        self.faults.check().await?;
        Ok(self.state.read().permissions_of(role_id))
    }

    async fn assign_role_to_user(&self, user_id: Uuid, role_id: Uuid) -> Result<(), StoreError> {
        self.faults.check().await?;
        let mut state = self.state.write();
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        if !state.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound(format!("role {}", role_id)));
        }
        state.user_roles.insert((user_id, role_id));
        Ok(())
    }

    async fn remove_role_from_user(&self, user_id: Uuid, role_id: Uuid) -> Result<(), StoreError> {
        self.faults.check().await?;
        self.state.write().user_roles.remove(&(user_id, role_id));
        Ok(())
    }

    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        self.faults.check().await?;
        let state = self.state.read();
        let mut roles: Vec<Role> = state
            .role_ids_of(user_id)
            .filter_map(|r| state.roles.get(&r))
            .map(|r| state.role_with_permissions(r))
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn get_user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>, StoreError> {
        self.faults.check().await?;
        let state = self.state.read();

        // Keyed by id for the distinct union, then ordered by (resource, action)
        let mut union: BTreeMap<(String, String, Uuid), Permission> = BTreeMap::new();
        for role_id in state.role_ids_of(user_id) {
            for permission in state.permissions_of(role_id) {
                union.insert(
                    (
                        permission.resource.clone(),
                        permission.action.clone(),
                        permission.id,
                    ),
                    permission,
                );
            }
        }

        Ok(union.into_values().collect())
    }

    async fn user_has_role(&self, user_id: Uuid, role_name: &str) -> Result<bool, StoreError> {
        self.membership_check(role_name).await?;
        let state = self.state.read();
        let found = state
            .role_ids_of(user_id)
            .filter_map(|r| state.roles.get(&r))
            .any(|r| r.name == role_name);
        Ok(found)
    }

    async fn user_has_permission(
        &self,
        user_id: Uuid,
        permission_name: &str,
    ) -> Result<bool, StoreError> {
        self.membership_check(permission_name).await?;
        let state = self.state.read();
        let found = state.role_ids_of(user_id).any(|role_id| {
            state
                .role_permissions
                .iter()
                .filter(|(r, _)| *r == role_id)
                .filter_map(|(_, p)| state.permissions.get(p))
                .any(|p| p.name == permission_name)
        });
        Ok(found)
    }
}

// ============================================================================
// Notification gateway
// ============================================================================

/// Gateway that records every delivery instead of sending it
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose every call fails with a transport error
    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully delivered (phone, code) pairs, oldest first
    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| p == phone)
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_otp(&self, phone: &str, code: &str) -> Result<(), GatewayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("injected delivery failure".to_string()));
        }
        self.sent.lock().push((phone.to_string(), code.to_string()));
        Ok(())
    }
}
