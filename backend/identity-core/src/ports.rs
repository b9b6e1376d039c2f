/// Collaborator contracts consumed by the core
///
/// - `ChallengeStore`: ephemeral key/value store with per-key expiry
/// - `NotificationGateway`: out-of-band OTP delivery
/// - `UserRepository` / `RbacRepository`: durable identity store
///
/// Production implementations live in `adapters` (Redis, HTTP SMS) and `db`
/// (PostgreSQL); `adapters::memory` provides in-process versions.
use crate::models::{NewPermission, Permission, Role, User};
use async_trait::async_trait;
use resilience::TimeoutError;
use std::time::Duration;
use uuid::Uuid;

/// Failure talking to a store.
///
/// `Unavailable`/`Timeout` are transient; `Conflict`/`NotFound` are definitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<TimeoutError> for StoreError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Elapsed(elapsed) => StoreError::Timeout(elapsed),
        }
    }
}

/// Failure delivering a notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway rejected request with status {0}")]
    Rejected(u16),
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway circuit open")]
    CircuitOpen,
}

/// Result of an atomic compare-and-delete on a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Value matched and was removed
    Consumed,
    /// A value exists but differs; nothing was removed
    Mismatch,
    /// Nothing stored (never issued, consumed, or expired)
    Absent,
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value and TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Store `value` only if `key` is absent or expired; `false` if it was taken
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete `key` iff it holds `expected`, as a single atomic step
    async fn consume_if_matches(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<ConsumeOutcome, StoreError>;
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_otp(&self, phone: &str, code: &str) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError>;

    /// Create a user identified only by phone. `Conflict` if the phone is taken.
    async fn create_with_phone(&self, phone: &str) -> Result<User, StoreError>;

    /// Persist a TOTP secret without touching the enabled flag
    async fn set_two_factor_secret(&self, user_id: Uuid, secret: &str) -> Result<(), StoreError>;

    /// Store backup code digests and set the enabled flag
    async fn enable_two_factor(
        &self,
        user_id: Uuid,
        backup_code_hashes: &[String],
    ) -> Result<(), StoreError>;

    /// Atomically remove one backup code digest; `false` if it was not present
    async fn consume_backup_code(&self, user_id: Uuid, code_hash: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RbacRepository: Send + Sync {
    async fn create_role(&self, name: &str, description: &str) -> Result<Role, StoreError>;

    async fn get_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, StoreError>;

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    async fn update_role(
        &self,
        role_id: Uuid,
        name: &str,
        description: &str,
    ) -> Result<Role, StoreError>;

    async fn delete_role(&self, role_id: Uuid) -> Result<(), StoreError>;

    async fn create_permission(&self, permission: &NewPermission)
        -> Result<Permission, StoreError>;

    async fn get_permission_by_id(
        &self,
        permission_id: Uuid,
    ) -> Result<Option<Permission>, StoreError>;

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    async fn delete_permission(&self, permission_id: Uuid) -> Result<(), StoreError>;

    /// Idempotent: assigning an existing pair is a no-op
    async fn assign_permission_to_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn remove_permission_from_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn get_role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>, StoreError>;

    /// Idempotent: assigning an existing pair is a no-op
    async fn assign_role_to_user(&self, user_id: Uuid, role_id: Uuid) -> Result<(), StoreError>;

    async fn remove_role_from_user(&self, user_id: Uuid, role_id: Uuid) -> Result<(), StoreError>;

    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError>;

    /// Distinct union of permissions across all of the user's roles
    async fn get_user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>, StoreError>;

    async fn user_has_role(&self, user_id: Uuid, role_name: &str) -> Result<bool, StoreError>;

    async fn user_has_permission(
        &self,
        user_id: Uuid,
        permission_name: &str,
    ) -> Result<bool, StoreError>;
}
