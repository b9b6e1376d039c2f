/// Authorization Engine
///
/// Resolves roles and permissions against the identity store on every call;
/// nothing is cached in process.
///
/// ## Administrator override
///
/// Role checks: a user holding `admin` passes every role check, including
/// roles that were never created. Permission checks have **no** override: an
/// administrator needs each permission granted through some role like anyone
/// else. The asymmetry is intentional and must not be unified here.
///
/// ## Composite checks
///
/// `has_any_role` / `has_any_permission` stop at the first match and
/// `has_all_permissions` stops at the first miss. A lookup error for one item
/// counts as a non-match for that item only.
use crate::error::{IdentityError, Result};
use crate::models::{NewPermission, Permission, Role, ADMIN_ROLE};
use crate::ports::{RbacRepository, StoreError};
use resilience::with_timeout_result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

async fn timed<T, F>(deadline: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StoreError>>,
{
    Ok(with_timeout_result(deadline, call).await?)
}

#[derive(Clone)]
pub struct AuthorizationEngine {
    rbac: Arc<dyn RbacRepository>,
    store_timeout: Duration,
}

impl AuthorizationEngine {
    pub fn new(rbac: Arc<dyn RbacRepository>, store_timeout: Duration) -> Self {
        Self {
            rbac,
            store_timeout,
        }
    }

    /// True if the user holds `role_name`, or holds the administrator role
    pub async fn user_has_role(&self, user_id: Uuid, role_name: &str) -> Result<bool> {
        if timed(self.store_timeout, self.rbac.user_has_role(user_id, role_name)).await? {
            return Ok(true);
        }
        if role_name == ADMIN_ROLE {
            return Ok(false);
        }
        timed(self.store_timeout, self.rbac.user_has_role(user_id, ADMIN_ROLE)).await
    }

    /// True if any of the user's roles grants `permission_name`
    pub async fn user_has_permission(&self, user_id: Uuid, permission_name: &str) -> Result<bool> {
        timed(
            self.store_timeout,
            self.rbac.user_has_permission(user_id, permission_name),
        )
        .await
    }

    pub async fn has_any_role(&self, user_id: Uuid, role_names: &[String]) -> bool {
        for role in role_names {
            match self.user_has_role(user_id, role).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => {
                    warn!(user_id = %user_id, role = %role, error = %err, "Role lookup failed; treating as no match");
                }
            }
        }
        false
    }

    pub async fn has_any_permission(&self, user_id: Uuid, permission_names: &[String]) -> bool {
        for permission in permission_names {
            match self.user_has_permission(user_id, permission).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => {
                    warn!(user_id = %user_id, permission = %permission, error = %err, "Permission lookup failed; treating as no match");
                }
            }
        }
        false
    }

    pub async fn has_all_permissions(&self, user_id: Uuid, permission_names: &[String]) -> bool {
        for permission in permission_names {
            match self.user_has_permission(user_id, permission).await {
                Ok(true) => {}
                Ok(false) => return false,
                Err(err) => {
                    warn!(user_id = %user_id, permission = %permission, error = %err, "Permission lookup failed; treating as no match");
                    return false;
                }
            }
        }
        true
    }

    /// Roles assigned to the user, ordered by name
    pub async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>> {
        timed(self.store_timeout, self.rbac.get_user_roles(user_id)).await
    }

    /// Effective permissions: the distinct union over all assigned roles
    pub async fn user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>> {
        timed(self.store_timeout, self.rbac.get_user_permissions(user_id)).await
    }
}

/// Role / permission management
#[derive(Clone)]
pub struct RbacAdmin {
    rbac: Arc<dyn RbacRepository>,
    store_timeout: Duration,
}

impl RbacAdmin {
    pub fn new(rbac: Arc<dyn RbacRepository>, store_timeout: Duration) -> Self {
        Self {
            rbac,
            store_timeout,
        }
    }

    // ---- Roles ----

    pub async fn create_role(&self, name: &str, description: &str) -> Result<Role> {
        let name = require_name("role", name)?;
        let role = timed(self.store_timeout, self.rbac.create_role(name, description)).await?;
        info!(role = %role.name, "Role created");
        Ok(role)
    }

    pub async fn get_role(&self, role_id: Uuid) -> Result<Role> {
        timed(self.store_timeout, self.rbac.get_role_by_id(role_id))
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("role {}", role_id)))
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Role> {
        timed(self.store_timeout, self.rbac.get_role_by_name(name))
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("role {}", name)))
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        timed(self.store_timeout, self.rbac.list_roles()).await
    }

    pub async fn update_role(&self, role_id: Uuid, name: &str, description: &str) -> Result<Role> {
        let name = require_name("role", name)?;
        timed(
            self.store_timeout,
            self.rbac.update_role(role_id, name, description),
        )
        .await
    }

    pub async fn delete_role(&self, role_id: Uuid) -> Result<()> {
        timed(self.store_timeout, self.rbac.delete_role(role_id)).await?;
        info!(role_id = %role_id, "Role deleted");
        Ok(())
    }

    // ---- Permissions ----

    pub async fn create_permission(&self, permission: &NewPermission) -> Result<Permission> {
        require_name("permission", &permission.name)?;
        require_name("resource", &permission.resource)?;
        require_name("action", &permission.action)?;

        let created = timed(self.store_timeout, self.rbac.create_permission(permission)).await?;
        info!(permission = %created.name, "Permission created");
        Ok(created)
    }

    pub async fn get_permission(&self, permission_id: Uuid) -> Result<Permission> {
        timed(self.store_timeout, self.rbac.get_permission_by_id(permission_id))
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("permission {}", permission_id)))
    }

    pub async fn get_permission_by_name(&self, name: &str) -> Result<Permission> {
        timed(self.store_timeout, self.rbac.get_permission_by_name(name))
            .await?
            .ok_or_else(|| IdentityError::NotFound(format!("permission {}", name)))
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        timed(self.store_timeout, self.rbac.list_permissions()).await
    }

    pub async fn delete_permission(&self, permission_id: Uuid) -> Result<()> {
        timed(self.store_timeout, self.rbac.delete_permission(permission_id)).await
    }

    // ---- Associations ----

    /// Grant a permission to a role; granting twice is a no-op
    pub async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        timed(
            self.store_timeout,
            self.rbac.assign_permission_to_role(role_id, permission_id),
        )
        .await
    }

    pub async fn revoke_permission(&self, role_id: Uuid, permission_id: Uuid) -> Result<()> {
        timed(
            self.store_timeout,
            self.rbac.remove_permission_from_role(role_id, permission_id),
        )
        .await
    }

    pub async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>> {
        timed(self.store_timeout, self.rbac.get_role_permissions(role_id)).await
    }

    /// Assign a role to a user; assigning twice is a no-op
    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<()> {
        timed(self.store_timeout, self.rbac.assign_role_to_user(user_id, role_id)).await?;
        info!(user_id = %user_id, role_id = %role_id, "Role assigned");
        Ok(())
    }

    pub async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<()> {
        timed(self.store_timeout, self.rbac.remove_role_from_user(user_id, role_id)).await?;
        info!(user_id = %user_id, role_id = %role_id, "Role revoked");
        Ok(())
    }
}

fn require_name<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::Validation(format!("{} name must not be empty", what)));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryIdentityStore;
    use crate::models::MODERATOR_ROLE;
    use crate::ports::UserRepository;

    async fn setup() -> (AuthorizationEngine, RbacAdmin, Arc<InMemoryIdentityStore>, Uuid) {
        let store = Arc::new(InMemoryIdentityStore::new());
        let user = store.create_with_phone("09123456789").await.unwrap();
        let timeout = Duration::from_secs(1);
        (
            AuthorizationEngine::new(store.clone(), timeout),
            RbacAdmin::new(store.clone(), timeout),
            store,
            user.id,
        )
    }

    #[tokio::test]
    async fn test_admin_overrides_role_checks_only() {
        let (engine, admin, _store, user_id) = setup().await;
        let admin_role = admin.create_role(ADMIN_ROLE, "").await.unwrap();
        admin
            .create_permission(&NewPermission::new("file:delete", "file", "delete"))
            .await
            .unwrap();
        admin.assign_role(user_id, admin_role.id).await.unwrap();

        assert!(engine.user_has_role(user_id, MODERATOR_ROLE).await.unwrap());
        assert!(engine.user_has_role(user_id, "never-created").await.unwrap());
        assert!(!engine.user_has_permission(user_id, "file:delete").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_admin_role_check() {
        let (engine, admin, _store, user_id) = setup().await;
        let moderator = admin.create_role(MODERATOR_ROLE, "").await.unwrap();
        admin.assign_role(user_id, moderator.id).await.unwrap();

        assert!(engine.user_has_role(user_id, MODERATOR_ROLE).await.unwrap());
        assert!(!engine.user_has_role(user_id, ADMIN_ROLE).await.unwrap());
    }

    #[tokio::test]
    async fn test_all_permissions_fails_fast() {
        let (engine, admin, store, user_id) = setup().await;
        let role = admin.create_role("editor", "").await.unwrap();
        let read = admin
            .create_permission(&NewPermission::new("post:read", "post", "read"))
            .await
            .unwrap();
        admin.grant_permission(role.id, read.id).await.unwrap();
        admin.assign_role(user_id, role.id).await.unwrap();

        let before = store.lookup_count();
        let names = vec![
            "post:write".to_string(),
            "post:read".to_string(),
            "post:delete".to_string(),
        ];
        assert!(!engine.has_all_permissions(user_id, &names).await);
        assert_eq!(store.lookup_count() - before, 1);

        assert!(engine.has_any_permission(user_id, &names).await);
    }

    #[tokio::test]
    async fn test_empty_role_name_rejected() {
        let (_engine, admin, _store, _user_id) = setup().await;
        let err = admin.create_role("  ", "").await.unwrap_err();
        assert!(matches!(err, IdentityError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_role_name() {
        let (_engine, admin, _store, _user_id) = setup().await;
        admin.create_role("support", "").await.unwrap();
        let err = admin.create_role("support", "").await.unwrap_err();
        assert!(matches!(err, IdentityError::AlreadyExists(_)));
    }
}
